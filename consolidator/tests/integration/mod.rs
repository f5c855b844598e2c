mod amend_test;
mod load_oldest_test;
mod load_specified_test;
mod oldest_change_time_test;
