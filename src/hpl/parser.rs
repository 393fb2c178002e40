//! Single-run HPL output parsing

use crate::error::{HarnessError, Result};
use crate::harness::strategy::Parser;
use crate::hpl::summary::parse_summaries;

/// Extracts wall time and Gflop/s from the first HPL result of a run
#[derive(Debug, Clone, Copy, Default)]
pub struct HplParser;

impl Parser for HplParser {
    fn metrics(&self) -> Vec<String> {
        vec!["time_s".to_string(), "gflops".to_string()]
    }

    fn parse(&self, output: &str) -> Result<Vec<(String, f64)>> {
        let record = parse_summaries(output)
            .into_iter()
            .next()
            .ok_or_else(|| HarnessError::parse("gflops", "no HPL result line in output"))?;

        if !record.passed {
            return Err(HarnessError::parse(
                "gflops",
                format!("{} did not pass the residual check", record.token),
            ));
        }

        Ok(vec![
            ("time_s".to_string(), record.time_s),
            ("gflops".to_string(), record.gflops),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hpl::summary::tests::OUTPUT;

    #[test]
    fn test_first_result() {
        let metrics = HplParser.parse(OUTPUT).unwrap();
        assert_eq!(
            metrics,
            vec![("time_s".to_string(), 61.62), ("gflops".to_string(), 692.45)]
        );
    }

    #[test]
    fn test_no_result() {
        assert!(matches!(
            HplParser.parse("mpirun: command not found"),
            Err(HarnessError::Parse { .. })
        ));
    }

    #[test]
    fn test_failed_residual() {
        let failed = OUTPUT.split("====\nWR05").next().unwrap();
        let failed = &failed[failed.find("WC13L4R16").unwrap()..];
        assert!(HplParser.parse(failed).is_err());
    }
}
