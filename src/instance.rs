use crate::error::{Result, ShopError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Largest big-M accepted. Larger constants leave the LP relaxation too
/// ill-conditioned for the solver to certify integral solutions.
pub const MAX_BIG_M: f64 = 1e5;

/// A flexible job-shop instance: jobs made of ordered operations, each of which
/// may run on any of its eligible machines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub machines: usize,
    #[serde(rename = "bigM")]
    pub big_m: f64,
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Processing time on each machine, indexed by machine.
    pub times: Vec<u32>,
    pub eligible: BTreeSet<usize>,
}

impl Operation {
    fn new(times: &[u32]) -> Self {
        Operation {
            times: times.to_vec(),
            eligible: (0..times.len()).collect(),
        }
    }

    /// Largest processing time among the eligible machines.
    fn longest(&self) -> u32 {
        self.eligible
            .iter()
            .filter_map(|&k| self.times.get(k))
            .copied()
            .max()
            .unwrap_or(0)
    }
}

impl Instance {
    /// Two jobs of two operations each on two machines, every operation
    /// eligible everywhere.
    pub fn two_by_two() -> Self {
        Instance {
            machines: 2,
            big_m: 500.0,
            jobs: vec![
                Job {
                    operations: vec![Operation::new(&[2, 37]), Operation::new(&[32, 24])],
                },
                Job {
                    operations: vec![Operation::new(&[45, 65]), Operation::new(&[21, 65])],
                },
            ],
        }
    }

    /// Read an instance from a YAML file and validate it.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let buf = std::fs::read_to_string(path)?;
        let instance: Instance = serde_yaml::from_str(&buf)?;
        instance.validate()?;
        Ok(instance)
    }

    pub fn processing_time(&self, job: usize, operation: usize, machine: usize) -> u32 {
        self.jobs[job].operations[operation].times[machine]
    }

    pub fn eligible(&self, job: usize, operation: usize) -> &BTreeSet<usize> {
        &self.jobs[job].operations[operation].eligible
    }

    /// Length of the schedule that runs every operation one after another on
    /// its slowest eligible machine.
    pub fn horizon(&self) -> f64 {
        self.jobs
            .iter()
            .flat_map(|job| job.operations.iter())
            .map(|op| op.longest() as f64)
            .sum()
    }

    pub fn validate(&self) -> Result<()> {
        if self.machines == 0 {
            return Err(ShopError::InvalidInstance("no machines".into()));
        }
        if self.jobs.is_empty() {
            return Err(ShopError::InvalidInstance("no jobs".into()));
        }

        for (i, job) in self.jobs.iter().enumerate() {
            if job.operations.is_empty() {
                return Err(ShopError::InvalidInstance(format!("job {i} has no operations")));
            }
            for (j, op) in job.operations.iter().enumerate() {
                if op.times.len() != self.machines {
                    return Err(ShopError::InvalidInstance(format!(
                        "operation ({i}, {j}) has {} processing times for {} machines",
                        op.times.len(),
                        self.machines
                    )));
                }
                if op.eligible.is_empty() {
                    return Err(ShopError::InvalidInstance(format!(
                        "operation ({i}, {j}) has no eligible machine"
                    )));
                }
                if let Some(&k) = op.eligible.iter().find(|&&k| k >= self.machines) {
                    return Err(ShopError::InvalidInstance(format!(
                        "operation ({i}, {j}) names unknown machine {k}"
                    )));
                }
            }
        }

        if !self.big_m.is_finite() {
            return Err(ShopError::InvalidInstance(format!(
                "big-M must be finite, got {}",
                self.big_m
            )));
        }
        if self.big_m > MAX_BIG_M {
            return Err(ShopError::BigMTooLarge {
                big_m: self.big_m,
                limit: MAX_BIG_M,
            });
        }

        // S + C <= M must admit a serial schedule
        let required = 2.0 * self.horizon();
        if self.big_m < required {
            return Err(ShopError::BigMTooSmall {
                big_m: self.big_m,
                required,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_instance_is_valid() {
        let instance = Instance::two_by_two();
        assert!(instance.validate().is_ok());
        assert_eq!(instance.horizon(), 37.0 + 32.0 + 65.0 + 65.0);
        assert_eq!(instance.processing_time(1, 0, 1), 65);
        assert_eq!(instance.eligible(0, 1).len(), 2);
    }

    #[test]
    fn rejects_small_big_m() {
        let mut instance = Instance::two_by_two();
        instance.big_m = 100.0;
        match instance.validate() {
            Err(ShopError::BigMTooSmall { required, .. }) => assert_eq!(required, 398.0),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rejects_non_finite_big_m() {
        for value in [".nan", ".inf", "-.inf"] {
            let yaml = format!(
                "machines: 1\nbigM: {value}\njobs:\n  - operations:\n      - times: [3]\n        eligible: [0]\n"
            );
            let instance: Instance = serde_yaml::from_str(&yaml).unwrap();
            assert!(
                matches!(instance.validate(), Err(ShopError::InvalidInstance(_))),
                "bigM: {value}"
            );
        }
    }

    #[test]
    fn rejects_huge_big_m() {
        let mut instance = Instance::two_by_two();
        instance.big_m = 1e12;
        assert!(matches!(
            instance.validate(),
            Err(ShopError::BigMTooLarge { .. })
        ));

        instance.big_m = MAX_BIG_M;
        assert!(instance.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_machine() {
        let mut instance = Instance::two_by_two();
        instance.jobs[0].operations[1].eligible.insert(2);
        assert!(matches!(
            instance.validate(),
            Err(ShopError::InvalidInstance(_))
        ));
    }

    #[test]
    fn rejects_mismatched_times() {
        let mut instance = Instance::two_by_two();
        instance.jobs[1].operations[0].times.push(9);
        assert!(matches!(
            instance.validate(),
            Err(ShopError::InvalidInstance(_))
        ));
    }

    #[test]
    fn parses_yaml() {
        let yaml = r#"
machines: 2
bigM: 500
jobs:
  - operations:
      - times: [2, 37]
        eligible: [0, 1]
      - times: [32, 24]
        eligible: [1]
"#;
        let instance: Instance = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(instance.jobs[0].operations[1].eligible, BTreeSet::from([1]));
        assert_eq!(instance.horizon(), 37.0 + 24.0);
        assert!(instance.validate().is_ok());
    }
}
