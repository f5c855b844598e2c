use fail::FailScenario;

/// Fail point configuration that is reset when dropped.
pub struct ConsolidatorFailScenario<'a> {
    _scenario: FailScenario<'a>,
    failpoints: Vec<String>,
}

impl<'a> ConsolidatorFailScenario<'a> {
    /// Configures each `(failpoint, action)` pair, e.g. `("load_change.before_delete", "return")`.
    pub fn setup(failpoints: &[(&str, &str)]) -> ConsolidatorFailScenario<'a> {
        let scenario = FailScenario::setup();

        for (failpoint, action) in failpoints {
            fail::cfg(*failpoint, action).unwrap();
        }

        Self {
            _scenario: scenario,
            failpoints: failpoints
                .iter()
                .map(|(failpoint, _)| failpoint.to_string())
                .collect(),
        }
    }

    pub fn teardown(self) {
        drop(self);
    }
}

impl Drop for ConsolidatorFailScenario<'_> {
    fn drop(&mut self) {
        for failpoint in &self.failpoints {
            fail::cfg(failpoint, "off").unwrap();
        }
    }
}
