//! Output formatting for policy results

use attest_policy_core::{DatalogPolicy, PolicyRecord, RelationOutput, StructuralPolicy};
use clap::ValueEnum;
use serde::Serialize;
use std::io::Write;

/// Output format options for CLI results
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON for machine processing
    Json,
}

/// Result of evaluating one Datalog policy
#[derive(Debug, Clone, Serialize)]
pub struct DatalogOutput {
    pub policy_hash: String,
    pub passed: bool,
    pub passed_policies: Vec<PolicyRecord>,
    pub failed_policies: Vec<PolicyRecord>,
    pub relations: RelationOutput,
}

impl DatalogOutput {
    pub fn from_policy(policy: &DatalogPolicy, passed: bool) -> Self {
        Self {
            policy_hash: policy.hash().to_string(),
            passed,
            passed_policies: policy.passed().to_vec(),
            failed_policies: policy.failed().to_vec(),
            relations: policy.relations().clone(),
        }
    }

    pub fn render<W: Write>(&self, format: OutputFormat, out: &mut W) -> anyhow::Result<()> {
        match format {
            OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(self)?)?,
            OutputFormat::Text => {
                writeln!(out, "Policy results:")?;
                for (relation, rows) in &self.relations {
                    writeln!(out, "{}", relation)?;
                    for row in rows {
                        writeln!(out, "    {}", row.join("\t"))?;
                    }
                }
                writeln!(out, "Verdict: {}", verdict(self.passed))?;
            }
        }
        Ok(())
    }
}

/// Result of validating one document against a structural policy
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutput {
    pub id: String,
    pub description: String,
    pub target: String,
    pub passed: bool,
}

impl ValidationOutput {
    pub fn from_policy(policy: &StructuralPolicy, passed: bool) -> Self {
        Self {
            id: policy.id.clone(),
            description: policy.description.clone(),
            target: policy.target.clone(),
            passed,
        }
    }

    pub fn render<W: Write>(&self, format: OutputFormat, out: &mut W) -> anyhow::Result<()> {
        match format {
            OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(self)?)?,
            OutputFormat::Text => writeln!(
                out,
                "Policy(id='{}', description='{}'): {}",
                self.id,
                self.description,
                verdict(self.passed)
            )?,
        }
        Ok(())
    }
}

/// Combined result of a registry check
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckOutput {
    /// `None` when no Datalog policy was loaded
    pub datalog_passed: Option<bool>,
    pub passed_policies: Vec<PolicyRecord>,
    pub failed_policies: Vec<PolicyRecord>,
    pub validation: Option<ValidationOutput>,
}

impl CheckOutput {
    pub fn passed(&self) -> bool {
        self.datalog_passed.unwrap_or(true) && self.validation.as_ref().map_or(true, |v| v.passed)
    }

    pub fn render<W: Write>(&self, format: OutputFormat, out: &mut W) -> anyhow::Result<()> {
        match format {
            OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(self)?)?,
            OutputFormat::Text => {
                if self.datalog_passed.is_some() {
                    writeln!(out, "Passed policies:")?;
                    for record in &self.passed_policies {
                        writeln!(out, "    {}", record)?;
                    }
                    writeln!(out, "Failed policies:")?;
                    for record in &self.failed_policies {
                        writeln!(out, "    {}", record)?;
                    }
                }
                if let Some(validation) = &self.validation {
                    validation.render(OutputFormat::Text, out)?;
                }
                writeln!(out, "Verdict: {}", verdict(self.passed()))?;
            }
        }
        Ok(())
    }
}

fn verdict(passed: bool) -> &'static str {
    if passed {
        "PASSED"
    } else {
        "FAILED"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DatalogOutput {
        let mut relations = RelationOutput::new();
        relations.insert(
            "passed_policies".to_string(),
            vec![vec!["auth".to_string(), "10".to_string()]],
        );
        relations.insert("failed_policies".to_string(), vec![]);
        DatalogOutput {
            policy_hash: "abc".to_string(),
            passed: true,
            passed_policies: vec![PolicyRecord::new("auth", 10, None)],
            failed_policies: vec![],
            relations,
        }
    }

    #[test]
    fn test_text_render() {
        let mut out = Vec::new();
        sample().render(OutputFormat::Text, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Policy results:\nfailed_policies\npassed_policies\n    auth\t10\nVerdict: PASSED\n"
        );
    }

    #[test]
    fn test_check_render() {
        let output = CheckOutput {
            datalog_passed: Some(false),
            passed_policies: vec![PolicyRecord::new("auth", 10, None)],
            failed_policies: vec![PolicyRecord::new("prov", 11, Some("missing".to_string()))],
            validation: None,
        };
        let mut out = Vec::new();
        output.render(OutputFormat::Text, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Passed policies:\n    auth (repository 10)\nFailed policies:\n    prov (repository 11): missing\nVerdict: FAILED\n"
        );
        assert!(CheckOutput::default().passed());
    }

    #[test]
    fn test_json_render() {
        let mut out = Vec::new();
        sample().render(OutputFormat::Json, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["passed"], true);
        assert_eq!(value["passed_policies"][0]["repository"], 10);
        assert!(value["passed_policies"][0].get("reason").is_none());
    }
}
