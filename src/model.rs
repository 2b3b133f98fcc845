use crate::error::{Result, ShopError};
use crate::instance::Instance;
use crate::schedule::SolvedSchedule;
use good_lp::Solution as LpSolution;
use good_lp::{
    Constraint, Expression, ProblemVariables, SolverModel, Variable, constraint, variable,
    variables,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// (job, operation, machine)
pub type OpKey = (usize, usize, usize);

/// (job, operation, other job, other operation, machine)
pub type PairKey = (usize, usize, usize, usize, usize);

type OpToVariableMap = BTreeMap<OpKey, Variable>;

/// Every decision variable of the formulation, keyed by what it describes.
pub(crate) struct DecisionVariables {
    /// X: operation runs on machine
    pub assignment: OpToVariableMap,
    /// S
    pub start: OpToVariableMap,
    /// C
    pub completion: OpToVariableMap,
    /// Y: 1 when this operation runs before the other one on the machine
    pub sequence: BTreeMap<PairKey, Variable>,
    /// Ci
    pub job_completion: Vec<Variable>,
    /// Cmax
    pub makespan: Variable,
}

impl DecisionVariables {
    fn len(&self) -> usize {
        self.assignment.len()
            + self.start.len()
            + self.completion.len()
            + self.sequence.len()
            + self.job_completion.len()
            + 1
    }
}

/// Builds the MILP of a flexible job-shop instance and hands it to the solver.
///
/// The objective is the makespan. Machine choice is linearised with big-M
/// terms: start and completion variables of an operation on a machine are
/// pinned to zero unless that machine is chosen, and every pair of operations
/// of different jobs sharing a machine gets a binary ordering variable.
pub struct ModelBuilder<'a> {
    instance: &'a Instance,
    problem: ProblemVariables,
    vars: DecisionVariables,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(instance: &'a Instance) -> Result<Self> {
        instance.validate()?;
        let (problem, vars) = init_variables(instance);
        debug!(variables = vars.len(), "declared decision variables");
        Ok(ModelBuilder {
            instance,
            problem,
            vars,
        })
    }

    pub fn variable_count(&self) -> usize {
        self.vars.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints().len()
    }

    fn constraints(&self) -> Vec<Constraint> {
        let (instance, vars) = (self.instance, &self.vars);
        let mut constraints = Vec::new();
        constraints.extend(constrain_operation_precedence(instance, vars));
        constraints.extend(constrain_job_completion(instance, vars));
        constraints.extend(constrain_makespan(vars));
        constraints.extend(constrain_single_assignment(instance, vars));
        constraints.extend(constrain_processing_times(instance, vars));
        constraints.extend(constrain_machine_sequences(instance, vars));
        constraints
    }

    /// Solve the model to optimality. Infeasible, unbounded and backend
    /// failures all come back as [`ShopError::NoSolution`].
    pub fn solve(self) -> Result<SolvedSchedule> {
        let constraints = self.constraints();
        debug!(constraints = constraints.len(), "built constraints");

        let ModelBuilder {
            instance,
            problem,
            vars,
        } = self;

        let model = create_model(problem, vars.makespan.into());
        let model = constraints.into_iter().fold(model, |m, c| m.with(c));

        let solution = model.solve().map_err(|err| {
            warn!(%err, "solver returned no solution");
            ShopError::NoSolution(err.to_string())
        })?;

        let schedule = create_solved_schedule(&solution, instance, &vars);
        info!(makespan = schedule.makespan(), "solved");
        Ok(schedule)
    }
}

fn init_variables(instance: &Instance) -> (ProblemVariables, DecisionVariables) {
    let mut problem_vars = variables!();
    let mut assignment = BTreeMap::new();
    let mut start = BTreeMap::new();
    let mut completion = BTreeMap::new();
    let mut sequence = BTreeMap::new();
    let mut job_completion = Vec::with_capacity(instance.jobs.len());

    let makespan = problem_vars.add(variable().min(0.0));

    for (i, job) in instance.jobs.iter().enumerate() {
        for (j, op) in job.operations.iter().enumerate() {
            for &k in &op.eligible {
                assignment.insert((i, j, k), problem_vars.add(variable().binary()));
                start.insert((i, j, k), problem_vars.add(variable().min(0.0)));
                completion.insert((i, j, k), problem_vars.add(variable().min(0.0)));

                // One ordering variable per operation of every other job that can share k
                for (i2, other) in instance.jobs.iter().enumerate() {
                    if i2 == i {
                        continue;
                    }
                    for (j2, other_op) in other.operations.iter().enumerate() {
                        if other_op.eligible.contains(&k) {
                            let y = problem_vars.add(variable().binary());
                            sequence.insert((i, j, i2, j2, k), y);
                        }
                    }
                }
            }
        }
        job_completion.push(problem_vars.add(variable().min(0.0)));
    }

    let vars = DecisionVariables {
        assignment,
        start,
        completion,
        sequence,
        job_completion,
        makespan,
    };
    (problem_vars, vars)
}

/// Create a model minimising the given objective
#[cfg(not(feature = "cbc"))]
fn create_model(variables: ProblemVariables, objective: Expression) -> impl SolverModel {
    variables
        .minimise(objective)
        .using(good_lp::solvers::microlp::microlp)
}

/// Create a model minimising the given objective
#[cfg(feature = "cbc")]
fn create_model(variables: ProblemVariables, objective: Expression) -> impl SolverModel {
    #[allow(unused_mut)]
    let mut model = variables
        .minimise(objective)
        .using(good_lp::solvers::coin_cbc::coin_cbc);
    #[cfg(not(debug_assertions))]
    model.set_parameter("loglevel", "0");
    model
}

/// Sum of one variable family over the eligible machines of an operation
fn sum_over_machines(
    instance: &Instance,
    map: &OpToVariableMap,
    job: usize,
    operation: usize,
) -> Expression {
    instance
        .eligible(job, operation)
        .iter()
        .map(|&k| map[&(job, operation, k)])
        .fold(Expression::from(0.0), |sum, v| sum + v)
}

/// An operation starts after the previous operation of its job completes
fn constrain_operation_precedence(
    instance: &Instance,
    vars: &DecisionVariables,
) -> Vec<Constraint> {
    instance
        .jobs
        .iter()
        .enumerate()
        .flat_map(|(i, job)| (1..job.operations.len()).map(move |j| (i, j)))
        .map(|(i, j)| {
            let start = sum_over_machines(instance, &vars.start, i, j);
            let previous = sum_over_machines(instance, &vars.completion, i, j - 1);
            constraint!(start >= previous)
        })
        .collect()
}

/// Ci equals the completion of the job's last operation
fn constrain_job_completion(instance: &Instance, vars: &DecisionVariables) -> Vec<Constraint> {
    instance
        .jobs
        .iter()
        .enumerate()
        .map(|(i, job)| {
            let last = job.operations.len() - 1;
            let ci = vars.job_completion[i];
            let end = sum_over_machines(instance, &vars.completion, i, last);
            constraint!(ci == end)
        })
        .collect()
}

fn constrain_makespan(vars: &DecisionVariables) -> Vec<Constraint> {
    let cmax = vars.makespan;
    vars.job_completion
        .iter()
        .map(|&ci| constraint!(cmax >= ci))
        .collect()
}

/// Each operation runs on exactly one of its eligible machines
fn constrain_single_assignment(instance: &Instance, vars: &DecisionVariables) -> Vec<Constraint> {
    instance
        .jobs
        .iter()
        .enumerate()
        .flat_map(|(i, job)| (0..job.operations.len()).map(move |j| (i, j)))
        .map(|(i, j)| {
            let assigned = sum_over_machines(instance, &vars.assignment, i, j);
            constraint!(assigned == 1.0)
        })
        .collect()
}

/// On the chosen machine C = S + t; on every other machine S = C = 0
fn constrain_processing_times(instance: &Instance, vars: &DecisionVariables) -> Vec<Constraint> {
    let big_m = instance.big_m;
    vars.assignment
        .iter()
        .flat_map(|(&(i, j, k), &x)| {
            let s = vars.start[&(i, j, k)];
            let c = vars.completion[&(i, j, k)];
            let t = instance.processing_time(i, j, k) as f64;

            // slack is M when the machine is not chosen, 0 otherwise
            let slack = Expression::from(0.0) + big_m - x * big_m;
            [
                constraint!(s + c <= x * big_m),
                constraint!(c >= s + t - slack.clone()),
                constraint!(c <= s + t + slack),
            ]
        })
        .collect()
}

/// Two operations of different jobs on the same machine do not overlap
fn constrain_machine_sequences(instance: &Instance, vars: &DecisionVariables) -> Vec<Constraint> {
    let big_m = instance.big_m;
    vars.sequence
        .iter()
        .flat_map(|(&(i, j, i2, j2, k), &y)| {
            let s = vars.start[&(i, j, k)];
            let c = vars.completion[&(i, j, k)];
            let s2 = vars.start[&(i2, j2, k)];
            let c2 = vars.completion[&(i2, j2, k)];
            [
                constraint!(s >= c2 - y * big_m),
                constraint!(s2 >= c + y * big_m - big_m),
            ]
        })
        .collect()
}

/// Read every decision variable back out of the solver's solution
fn create_solved_schedule(
    solution: &impl LpSolution,
    instance: &Instance,
    vars: &DecisionVariables,
) -> SolvedSchedule {
    let values = |map: &OpToVariableMap| -> BTreeMap<OpKey, f64> {
        map.iter()
            .map(|(&key, &var)| (key, solution.value(var)))
            .collect()
    };

    SolvedSchedule {
        instance: instance.clone(),
        assignment: values(&vars.assignment),
        start: values(&vars.start),
        completion: values(&vars.completion),
        sequence: vars
            .sequence
            .iter()
            .map(|(&key, &var)| (key, solution.value(var)))
            .collect(),
        job_completion: vars
            .job_completion
            .iter()
            .map(|&var| solution.value(var))
            .collect(),
        makespan: solution.value(vars.makespan),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{Job, Operation};
    use std::collections::BTreeSet;

    #[test]
    fn two_by_two_model_size() {
        let instance = Instance::two_by_two();
        let builder = ModelBuilder::new(&instance).unwrap();
        // 8 each of X, S, C; 16 Y; 2 Ci; Cmax
        assert_eq!(builder.variable_count(), 43);
        // precedence 2, Ci 2, Cmax 2, assignment 4, times 3 * 8, sequencing 2 * 16
        assert_eq!(builder.constraint_count(), 66);
    }

    #[test]
    fn sequencing_only_for_shared_machines() {
        let op = |times: [u32; 2], eligible: &[usize]| Operation {
            times: times.to_vec(),
            eligible: eligible.iter().copied().collect::<BTreeSet<_>>(),
        };
        let instance = Instance {
            machines: 2,
            big_m: 100.0,
            jobs: vec![
                Job {
                    operations: vec![op([3, 3], &[0])],
                },
                Job {
                    operations: vec![op([4, 4], &[1])],
                },
            ],
        };
        let builder = ModelBuilder::new(&instance).unwrap();
        assert!(builder.vars.sequence.is_empty());

        let schedule = builder.solve().unwrap();
        assert!((schedule.makespan() - 4.0).abs() < 1e-6);
        assert_eq!(schedule.verify(), Ok(()));
    }

    #[test]
    fn shared_machine_serialises_jobs() {
        let op = |t: u32| Operation {
            times: vec![t],
            eligible: BTreeSet::from([0]),
        };
        let instance = Instance {
            machines: 1,
            big_m: 100.0,
            jobs: vec![
                Job {
                    operations: vec![op(5), op(2)],
                },
                Job {
                    operations: vec![op(3)],
                },
            ],
        };
        let schedule = ModelBuilder::new(&instance).unwrap().solve().unwrap();
        assert!((schedule.makespan() - 10.0).abs() < 1e-6);
        assert_eq!(schedule.verify(), Ok(()));
    }

    #[test]
    fn infeasible_model_reports_no_solution() {
        // M = 10 pins every S + C below 10, but job 1 alone needs 66
        let mut instance = Instance::two_by_two();
        instance.big_m = 10.0;
        let (problem, vars) = init_variables(&instance);
        let builder = ModelBuilder {
            instance: &instance,
            problem,
            vars,
        };
        assert!(matches!(builder.solve(), Err(ShopError::NoSolution(_))));
    }

    #[test]
    fn invalid_instance_is_rejected_before_modelling() {
        let mut instance = Instance::two_by_two();
        instance.jobs[0].operations.clear();
        assert!(matches!(
            ModelBuilder::new(&instance),
            Err(ShopError::InvalidInstance(_))
        ));
    }
}
