//! Regression runner — natural-language question sets against a deployed
//! semantic view.
//!
//! Each question is sent to the analyst endpoint and judged against its
//! declared expectations. Failing expectations are a normal outcome
//! (`overall_pass = false`), not a program error; transport failures and
//! deadline expiries propagate as retryable task errors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{OdlError, Result};
use crate::ports::WarehouseAdapter;
use crate::runner::CancelFlag;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionExpectation {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_tables: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_sql_patterns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_answer_snippet: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionSet {
    pub questions: Vec<QuestionExpectation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question: String,
    pub passed: bool,
    pub sql: String,
    pub answer: String,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionOutcome {
    pub view_fqn: String,
    pub total_questions: usize,
    pub passed: usize,
    pub failed: usize,
    pub overall_pass: bool,
    pub total_latency_ms: u64,
    pub results: Vec<QuestionResult>,
}

impl RegressionOutcome {
    /// JUnit-style XML summary (one testsuite, one testcase per question).
    pub fn to_junit_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str(&format!(
            "<testsuite name=\"regression {}\" tests=\"{}\" failures=\"{}\" time=\"{:.3}\">\n",
            xml_escape(&self.view_fqn),
            self.total_questions,
            self.failed,
            self.total_latency_ms as f64 / 1000.0
        ));
        for result in &self.results {
            xml.push_str(&format!(
                "  <testcase name=\"{}\" time=\"{:.3}\"",
                xml_escape(&result.question),
                result.latency_ms as f64 / 1000.0
            ));
            if result.passed {
                xml.push_str(" />\n");
            } else {
                xml.push_str(&format!(
                    ">\n    <failure message=\"{}\" />\n  </testcase>\n",
                    xml_escape(result.failure_reason.as_deref().unwrap_or("expectation failed"))
                ));
            }
        }
        xml.push_str("</testsuite>\n");
        xml
    }
}

/// Judge one answer against its expectations. Expectations that were not
/// declared are skipped; the question passes iff every declared one holds.
pub fn judge(
    expectation: &QuestionExpectation,
    sql: &str,
    answer: &str,
) -> std::result::Result<(), String> {
    if let Some(tables) = &expectation.expected_tables {
        let sql_lower = sql.to_lowercase();
        for table in tables {
            if !sql_lower.contains(&table.to_lowercase()) {
                return Err(format!("expected table '{table}' not referenced in SQL"));
            }
        }
    }
    if let Some(patterns) = &expectation.expected_sql_patterns {
        for pattern in patterns {
            if !sql.contains(pattern) {
                return Err(format!("expected SQL pattern '{pattern}' not found"));
            }
        }
    }
    if let Some(snippet) = &expectation.expected_answer_snippet {
        if !answer.contains(snippet) {
            return Err(format!("expected answer snippet '{snippet}' not found"));
        }
    }
    Ok(())
}

pub struct RegressionRunner {
    adapter: Arc<dyn WarehouseAdapter>,
    config: EngineConfig,
}

impl RegressionRunner {
    pub fn new(adapter: Arc<dyn WarehouseAdapter>, config: EngineConfig) -> Self {
        Self { adapter, config }
    }

    /// Run the full question set. Cancellation is observed between
    /// questions; an in-flight analyst call completes.
    pub async fn run(
        &self,
        view_fqn: &str,
        set: &QuestionSet,
        cancel: &CancelFlag,
    ) -> Result<RegressionOutcome> {
        let mut results = Vec::with_capacity(set.questions.len());
        let mut total_latency_ms = 0u64;

        for expectation in &set.questions {
            cancel.checkpoint()?;

            let answer = match tokio::time::timeout(
                self.config.question_timeout,
                self.adapter.ask(view_fqn, &expectation.question),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(OdlError::Timeout(format!(
                        "question '{}' exceeded {}s deadline",
                        expectation.question,
                        self.config.question_timeout.as_secs()
                    )))
                }
            };

            total_latency_ms += answer.latency_ms;
            let verdict = judge(expectation, &answer.sql, &answer.answer);
            results.push(QuestionResult {
                question: expectation.question.clone(),
                passed: verdict.is_ok(),
                sql: answer.sql,
                answer: answer.answer,
                latency_ms: answer.latency_ms,
                failure_reason: verdict.err(),
            });
        }

        let passed = results.iter().filter(|r| r.passed).count();
        let failed = results.len() - passed;
        tracing::info!(
            view = view_fqn,
            passed,
            failed,
            total_latency_ms,
            "regression run complete"
        );

        Ok(RegressionOutcome {
            view_fqn: view_fqn.to_string(),
            total_questions: results.len(),
            passed,
            failed,
            overall_pass: failed == 0,
            total_latency_ms,
            results,
        })
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::ports::{AnalystAnswer, Catalog, DeployCallOutcome, VerifyOutcome};

    struct FakeAnalyst {
        answers: HashMap<String, (String, String)>,
        asked: Mutex<Vec<String>>,
    }

    impl FakeAnalyst {
        fn new(answers: &[(&str, &str, &str)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(q, sql, a)| (q.to_string(), (sql.to_string(), a.to_string())))
                    .collect(),
                asked: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl WarehouseAdapter for FakeAnalyst {
        async fn verify(&self, _: &str, _: &str, _: &str) -> Result<VerifyOutcome> {
            unreachable!()
        }
        async fn deploy(&self, _: &str, _: &str, _: &str, _: &str) -> Result<DeployCallOutcome> {
            unreachable!()
        }
        async fn export_existing(&self, _: &str) -> Result<Option<String>> {
            unreachable!()
        }
        async fn list_catalog(&self, _: &str, _: &str) -> Result<Catalog> {
            unreachable!()
        }
        async fn ask(&self, _view_fqn: &str, question: &str) -> Result<AnalystAnswer> {
            self.asked.lock().unwrap().push(question.to_string());
            let (sql, answer) = self
                .answers
                .get(question)
                .cloned()
                .unwrap_or_else(|| ("SELECT 1".into(), "no data".into()));
            Ok(AnalystAnswer {
                sql,
                answer,
                latency_ms: 42,
            })
        }
    }

    fn question(q: &str) -> QuestionExpectation {
        QuestionExpectation {
            question: q.into(),
            expected_tables: None,
            expected_sql_patterns: None,
            expected_answer_snippet: None,
        }
    }

    #[test]
    fn test_judge_tables_case_insensitive() {
        let expectation = QuestionExpectation {
            expected_tables: Some(vec!["ORDERS".into(), "customers".into()]),
            ..question("q")
        };
        assert!(judge(&expectation, "SELECT * FROM orders JOIN Customers", "").is_ok());
        assert!(judge(&expectation, "SELECT * FROM orders", "").is_err());
    }

    #[test]
    fn test_judge_patterns_literal() {
        let expectation = QuestionExpectation {
            expected_sql_patterns: Some(vec!["SUM(total)".into()]),
            ..question("q")
        };
        assert!(judge(&expectation, "SELECT SUM(total) FROM orders", "").is_ok());
        assert!(judge(&expectation, "SELECT sum(total) FROM orders", "").is_err());
    }

    #[test]
    fn test_judge_answer_snippet() {
        let expectation = QuestionExpectation {
            expected_answer_snippet: Some("42".into()),
            ..question("q")
        };
        assert!(judge(&expectation, "", "the total is 42 orders").is_ok());
        assert!(judge(&expectation, "", "no data").is_err());
    }

    #[test]
    fn test_judge_no_expectations_passes() {
        assert!(judge(&question("q"), "anything", "anything").is_ok());
    }

    #[tokio::test]
    async fn test_run_aggregates() {
        let adapter = FakeAnalyst::new(&[
            ("how many orders?", "SELECT COUNT(*) FROM orders", "120 orders"),
            ("revenue?", "SELECT SUM(total) FROM orders", "$9000"),
        ]);
        let runner = RegressionRunner::new(Arc::new(adapter), EngineConfig::default());
        let set = QuestionSet {
            questions: vec![
                QuestionExpectation {
                    expected_tables: Some(vec!["orders".into()]),
                    expected_answer_snippet: Some("120".into()),
                    ..question("how many orders?")
                },
                QuestionExpectation {
                    expected_tables: Some(vec!["order_items".into()]),
                    ..question("revenue?")
                },
            ],
        };
        let outcome = runner
            .run("RETAIL_DB.PUBLIC.retail_view", &set, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(outcome.total_questions, 2);
        assert_eq!(outcome.passed, 1);
        assert_eq!(outcome.failed, 1);
        assert!(!outcome.overall_pass);
        assert_eq!(outcome.total_latency_ms, 84);
        assert!(outcome.results[1].failure_reason.as_deref().unwrap().contains("order_items"));
    }

    #[tokio::test]
    async fn test_cancel_between_questions() {
        let adapter = FakeAnalyst::new(&[]);
        let runner = RegressionRunner::new(Arc::new(adapter), EngineConfig::default());
        let cancel = CancelFlag::new();
        cancel.cancel();
        let set = QuestionSet {
            questions: vec![question("q1"), question("q2")],
        };
        let err = runner
            .run("RETAIL_DB.PUBLIC.retail_view", &set, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CANCELED");
    }

    #[test]
    fn test_junit_xml_shape() {
        let outcome = RegressionOutcome {
            view_fqn: "DB.S.view".into(),
            total_questions: 2,
            passed: 1,
            failed: 1,
            overall_pass: false,
            total_latency_ms: 84,
            results: vec![
                QuestionResult {
                    question: "how many orders?".into(),
                    passed: true,
                    sql: "SELECT 1".into(),
                    answer: "1".into(),
                    latency_ms: 42,
                    failure_reason: None,
                },
                QuestionResult {
                    question: "q with <angle> & amp".into(),
                    passed: false,
                    sql: "SELECT 2".into(),
                    answer: "2".into(),
                    latency_ms: 42,
                    failure_reason: Some("expected table 'x' not referenced in SQL".into()),
                },
            ],
        };
        let xml = outcome.to_junit_xml();
        assert!(xml.contains("tests=\"2\""));
        assert!(xml.contains("failures=\"1\""));
        assert!(xml.contains("&lt;angle&gt; &amp; amp"));
        assert!(xml.contains("<failure message="));
    }
}
