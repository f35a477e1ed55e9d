//! Saga type definitions: the ordered step list per business transaction.

/// One step in a saga definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDefinition {
    /// Step name; also the key of the idempotency key sent to the remote.
    pub name: &'static str,
    /// Whether the step has a compensating action.
    pub compensating: bool,
}

impl StepDefinition {
    /// A step with no compensating action.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            compensating: false,
        }
    }

    /// A step whose effects can be undone.
    pub fn with_compensation(name: &'static str) -> Self {
        Self {
            name,
            compensating: true,
        }
    }
}

/// A saga type: a fixed, ordered list of steps.
#[derive(Debug, Clone)]
pub struct SagaDefinition {
    saga_type: &'static str,
    steps: Vec<StepDefinition>,
}

impl SagaDefinition {
    pub fn new(saga_type: &'static str, steps: Vec<StepDefinition>) -> Self {
        Self { saga_type, steps }
    }

    pub fn saga_type(&self) -> &'static str {
        self.saga_type
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the step at the given index, if in range.
    pub fn step_at(&self, index: usize) -> Option<&StepDefinition> {
        self.steps.get(index)
    }

    /// Looks a step up by name.
    pub fn find(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }
}
