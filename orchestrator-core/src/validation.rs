use std::collections::{HashMap, HashSet};

use crate::{
    error::{OrchestratorError, Result},
    models::{NewTask, WorkflowDefinition},
};

/// Validation utilities for task enqueue requests.
pub struct TaskValidator;

impl TaskValidator {
    /// `Enqueue` fails with `InvalidArgument` if `repository_path` is empty
    /// or `priority` falls outside `[0, 9]`.
    pub fn validate_new_task(task: &NewTask) -> Result<()> {
        if task.repository_path.trim().is_empty() {
            return Err(OrchestratorError::empty_field("repository_path"));
        }
        if task.command.trim().is_empty() {
            return Err(OrchestratorError::empty_field("command"));
        }
        if !(0..=9).contains(&task.priority) {
            return Err(OrchestratorError::InvalidArgument(format!(
                "priority must be in [0, 9], got {}",
                task.priority
            )));
        }
        Ok(())
    }
}

/// Validates a workflow definition's shape and dependency graph. Never
/// mutates the workflow or touches storage.
pub struct WorkflowValidator;

impl WorkflowValidator {
    pub fn validate(wf: &WorkflowDefinition) -> Result<()> {
        if wf.id.trim().is_empty() {
            return Err(OrchestratorError::ValidationFailed(
                "workflow id must not be empty".to_string(),
            ));
        }
        if wf.name.trim().is_empty() {
            return Err(OrchestratorError::ValidationFailed(
                "workflow name must not be empty".to_string(),
            ));
        }
        if wf.steps.is_empty() {
            return Err(OrchestratorError::ValidationFailed(
                "workflow must contain at least one step".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for step in &wf.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(OrchestratorError::ValidationFailed(format!(
                    "duplicate step id: {}",
                    step.id
                )));
            }
        }

        for step in &wf.steps {
            for dep in &step.depends_on {
                if dep == &step.id {
                    return Err(OrchestratorError::ValidationFailed(format!(
                        "step {} depends on itself",
                        step.id
                    )));
                }
                if !seen.contains(dep.as_str()) {
                    return Err(OrchestratorError::ValidationFailed(format!(
                        "step {} depends on unresolved step id {}",
                        step.id, dep
                    )));
                }
            }
        }

        Self::check_acyclic(wf)?;

        Ok(())
    }

    /// DFS with grey/black colouring.
    fn check_acyclic(wf: &WorkflowDefinition) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Colour {
            White,
            Grey,
            Black,
        }

        let adjacency: HashMap<&str, &[String]> = wf
            .steps
            .iter()
            .map(|s| (s.id.as_str(), s.depends_on.as_slice()))
            .collect();

        let mut colour: HashMap<&str, Colour> =
            wf.steps.iter().map(|s| (s.id.as_str(), Colour::White)).collect();

        fn visit<'a>(
            node: &'a str,
            adjacency: &HashMap<&'a str, &'a [String]>,
            colour: &mut HashMap<&'a str, Colour>,
        ) -> Result<()> {
            colour.insert(node, Colour::Grey);
            if let Some(deps) = adjacency.get(node) {
                for dep in deps.iter() {
                    match colour.get(dep.as_str()).copied().unwrap_or(Colour::White) {
                        Colour::Grey => {
                            return Err(OrchestratorError::ValidationFailed(format!(
                                "dependency cycle detected at step {dep}"
                            )))
                        }
                        Colour::White => visit(dep.as_str(), adjacency, colour)?,
                        Colour::Black => {}
                    }
                }
            }
            colour.insert(node, Colour::Black);
            Ok(())
        }

        for step in &wf.steps {
            if colour.get(step.id.as_str()).copied().unwrap_or(Colour::White) == Colour::White {
                visit(step.id.as_str(), &adjacency, &mut colour)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StepType, WorkflowMetadata, WorkflowStep};

    fn wf(steps: Vec<WorkflowStep>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf-1".to_string(),
            name: "test".to_string(),
            steps,
            variables: Default::default(),
            metadata: WorkflowMetadata::default(),
        }
    }

    #[test]
    fn rejects_empty_steps() {
        assert!(WorkflowValidator::validate(&wf(vec![])).is_err());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let w = wf(vec![
            WorkflowStep::new("a", StepType::Task),
            WorkflowStep::new("a", StepType::Task),
        ]);
        assert!(WorkflowValidator::validate(&w).is_err());
    }

    #[test]
    fn rejects_self_dependency() {
        let w = wf(vec![WorkflowStep::new("a", StepType::Task).with_depends_on(["a"])]);
        assert!(WorkflowValidator::validate(&w).is_err());
    }

    #[test]
    fn rejects_unresolved_dependency() {
        let w = wf(vec![WorkflowStep::new("a", StepType::Task).with_depends_on(["ghost"])]);
        assert!(WorkflowValidator::validate(&w).is_err());
    }

    #[test]
    fn rejects_cycles() {
        let w = wf(vec![
            WorkflowStep::new("a", StepType::Task).with_depends_on(["b"]),
            WorkflowStep::new("b", StepType::Task).with_depends_on(["a"]),
        ]);
        assert!(WorkflowValidator::validate(&w).is_err());
    }

    #[test]
    fn accepts_linear_chain() {
        let w = wf(vec![
            WorkflowStep::new("a", StepType::Task),
            WorkflowStep::new("b", StepType::Task).with_depends_on(["a"]),
            WorkflowStep::new("c", StepType::Task).with_depends_on(["b"]),
        ]);
        assert!(WorkflowValidator::validate(&w).is_ok());
    }

    #[test]
    fn accepts_diamond() {
        let w = wf(vec![
            WorkflowStep::new("a", StepType::Task),
            WorkflowStep::new("b", StepType::Task).with_depends_on(["a"]),
            WorkflowStep::new("c", StepType::Task).with_depends_on(["a"]),
            WorkflowStep::new("d", StepType::Task).with_depends_on(["b", "c"]),
        ]);
        assert!(WorkflowValidator::validate(&w).is_ok());
    }
}
