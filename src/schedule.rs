use crate::error::ScheduleViolation;
use crate::instance::Instance;
use crate::model::{OpKey, PairKey};
use std::collections::BTreeMap;
use std::fmt;

/// Absolute tolerance when reading solver values back.
pub const TOLERANCE: f64 = 1e-6;

/// Solved values of every decision variable of a model, together with the
/// instance they were solved for.
#[derive(Debug, Clone)]
pub struct SolvedSchedule {
    pub(crate) instance: Instance,
    pub(crate) assignment: BTreeMap<OpKey, f64>,
    pub(crate) start: BTreeMap<OpKey, f64>,
    pub(crate) completion: BTreeMap<OpKey, f64>,
    pub(crate) sequence: BTreeMap<PairKey, f64>,
    pub(crate) job_completion: Vec<f64>,
    pub(crate) makespan: f64,
}

/// Where and when one operation runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledOperation {
    pub job: usize,
    pub operation: usize,
    pub machine: usize,
    pub start: f64,
    pub end: f64,
}

fn is_set(value: f64) -> bool {
    value > 0.5
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= TOLERANCE
}

impl SolvedSchedule {
    pub fn makespan(&self) -> f64 {
        self.makespan
    }

    pub fn job_completion(&self, job: usize) -> f64 {
        self.job_completion[job]
    }

    /// The machine, start and end of every operation, ordered by job then
    /// operation. Operations without a chosen machine are left out.
    pub fn operations(&self) -> Vec<ScheduledOperation> {
        self.instance
            .jobs
            .iter()
            .enumerate()
            .flat_map(|(i, job)| (0..job.operations.len()).map(move |j| (i, j)))
            .filter_map(|(i, j)| {
                let machine = self
                    .instance
                    .eligible(i, j)
                    .iter()
                    .copied()
                    .find(|&k| is_set(self.assignment[&(i, j, k)]))?;
                Some(ScheduledOperation {
                    job: i,
                    operation: j,
                    machine,
                    start: self.start[&(i, j, machine)],
                    end: self.completion[&(i, j, machine)],
                })
            })
            .collect()
    }

    /// Check the solved values against the constraints of the model.
    pub fn verify(&self) -> Result<(), ScheduleViolation> {
        self.verify_binaries()?;
        self.verify_operations()?;

        let operations = self.operations();
        verify_precedence(&operations)?;
        verify_no_overlap(&operations)?;
        self.verify_completions(&operations)
    }

    fn verify_binaries(&self) -> Result<(), ScheduleViolation> {
        let assignments = self
            .assignment
            .iter()
            .map(|(&(i, j, k), &v)| (format!("X_{i}_{j}_{k}"), v));
        let sequences = self
            .sequence
            .iter()
            .map(|(&(i, j, i2, j2, k), &v)| (format!("Y_{i}_{j}_{i2}_{j2}_{k}"), v));

        for (name, value) in assignments.chain(sequences) {
            if !close(value, 0.0) && !close(value, 1.0) {
                return Err(ScheduleViolation::NotBinary { name, value });
            }
        }
        Ok(())
    }

    fn verify_operations(&self) -> Result<(), ScheduleViolation> {
        for (i, job) in self.instance.jobs.iter().enumerate() {
            for (j, op) in job.operations.iter().enumerate() {
                let count = op
                    .eligible
                    .iter()
                    .filter(|&&k| is_set(self.assignment[&(i, j, k)]))
                    .count();
                if count != 1 {
                    return Err(ScheduleViolation::Assignment {
                        job: i,
                        operation: j,
                        count,
                    });
                }

                for &k in &op.eligible {
                    let s = self.start[&(i, j, k)];
                    let c = self.completion[&(i, j, k)];
                    if !is_set(self.assignment[&(i, j, k)]) {
                        if !close(s, 0.0) || !close(c, 0.0) {
                            return Err(ScheduleViolation::Unassigned {
                                job: i,
                                operation: j,
                                machine: k,
                            });
                        }
                        continue;
                    }

                    let expected = s + op.times[k] as f64;
                    if !close(c, expected) {
                        return Err(ScheduleViolation::Duration {
                            job: i,
                            operation: j,
                            end: c,
                            expected,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn verify_completions(
        &self,
        operations: &[ScheduledOperation],
    ) -> Result<(), ScheduleViolation> {
        let mut latest = 0.0_f64;
        for (i, &value) in self.job_completion.iter().enumerate() {
            let expected = operations
                .iter()
                .filter(|op| op.job == i)
                .map(|op| op.end)
                .fold(0.0_f64, f64::max);
            if !close(value, expected) {
                return Err(ScheduleViolation::JobCompletion {
                    job: i,
                    value,
                    expected,
                });
            }
            latest = latest.max(value);
        }

        if !close(self.makespan, latest) {
            return Err(ScheduleViolation::Makespan {
                makespan: self.makespan,
                expected: latest,
            });
        }
        Ok(())
    }

    /// Every decision variable by name, in model order.
    pub fn report(&self) -> Report {
        let mut entries = vec![("Makespan".to_string(), self.makespan)];

        for (i, job) in self.instance.jobs.iter().enumerate() {
            for j in 0..job.operations.len() {
                for &k in self.instance.eligible(i, j) {
                    entries.push((format!("X_{i}_{j}_{k}"), self.assignment[&(i, j, k)]));
                    entries.push((format!("S_{i}_{j}_{k}"), self.start[&(i, j, k)]));
                    entries.push((format!("C_{i}_{j}_{k}"), self.completion[&(i, j, k)]));

                    let pairs = self
                        .sequence
                        .range((i, j, 0, 0, 0)..(i, j + 1, 0, 0, 0))
                        .filter(|((.., machine), _)| *machine == k);
                    for (&(_, _, i2, j2, _), &value) in pairs {
                        entries.push((format!("Y_{i}_{j}_{i2}_{j2}_{k}"), value));
                    }
                }
            }
            entries.push((format!("Ci_{i}"), self.job_completion[i]));
        }

        Report { entries }
    }
}

fn verify_precedence(operations: &[ScheduledOperation]) -> Result<(), ScheduleViolation> {
    for pair in operations.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if prev.job == next.job && next.start < prev.end - TOLERANCE {
            return Err(ScheduleViolation::Precedence {
                job: next.job,
                operation: next.operation,
            });
        }
    }
    Ok(())
}

fn verify_no_overlap(operations: &[ScheduledOperation]) -> Result<(), ScheduleViolation> {
    for (n, a) in operations.iter().enumerate() {
        for b in &operations[n + 1..] {
            if a.job == b.job || a.machine != b.machine {
                continue;
            }
            let disjoint = a.end <= b.start + TOLERANCE || b.end <= a.start + TOLERANCE;
            if !disjoint {
                return Err(ScheduleViolation::Overlap {
                    first: a.job,
                    second: b.job,
                    machine: a.machine,
                });
            }
        }
    }
    Ok(())
}

/// Plain-text listing of a solved schedule, one `name: value` per line.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub entries: Vec<(String, f64)>,
}

/// Drop solver noise below the tolerance so values print cleanly.
fn clean(value: f64) -> f64 {
    let rounded = (value * 1e6).round() / 1e6;
    if rounded == 0.0 { 0.0 } else { rounded }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            writeln!(f, "{}: {}", name, clean(*value))?;
        }
        Ok(())
    }
}
