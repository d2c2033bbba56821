//! Declarative workflow model.
//!
//! A [`WorkflowDefinition`] is materialized once (from a file, or built in
//! code) and never mutated afterwards. Field names follow the on-disk
//! format: a task's function id is `func`, its opaque type tag `type`, and
//! the decoding hint `responseStruct`.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::{END, START};
use crate::error::WorkflowError;

/// Stages, the edges between them, and the task bound to each stage.
///
/// # Examples
///
/// ```
/// use stagewatch::workflow::{TaskSpec, Transition, WorkflowDefinition};
///
/// let definition = WorkflowDefinition::new()
///     .stage("fetch")
///     .transition(Transition::new("start", "start", "fetch"))
///     .task(TaskSpec::new("fetch", "http_fetch"));
///
/// assert!(definition.validate().is_ok());
/// assert!(definition.is_known_state("fetch"));
/// assert!(definition.is_known_state("end"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Declared stage names, in declaration order.
    #[serde(default)]
    pub stages: Vec<String>,
    /// Named edges between stages.
    #[serde(default)]
    pub transitions: Vec<Transition>,
    /// Tasks, each bound to the stage of the same name.
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

/// A named edge: emitting event `name` in state `from` moves to `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Event name that selects this edge.
    pub name: String,
    /// Source state.
    pub from: String,
    /// Target state.
    pub to: String,
}

impl Transition {
    /// Creates an edge.
    pub fn new(name: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            from: from.into(),
            to: to.into(),
        }
    }
}

/// A declarative unit of work.
///
/// On disk the request fields (`url`, `method`, `headers`) sit directly on
/// the task; `method` or `headers` without `url` is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TaskRecord", into = "TaskRecord")]
pub struct TaskSpec {
    /// Task name; also the stage it is bound to.
    pub name: String,
    /// Identifier looked up in the [`CallbackRegistry`](crate::CallbackRegistry).
    pub function_id: String,
    /// Free-form type tag, passed through to handlers.
    pub kind: Option<String>,
    /// Event emitted after this task runs. Defaults to the stage name.
    pub event: Option<String>,
    /// Request payload for handlers that talk to a remote endpoint.
    pub request: Option<RequestDescriptor>,
    /// Name of an earlier task whose result is handed to this one.
    pub store: Option<String>,
    /// Shape the handler should decode its input as.
    pub response_struct: Option<String>,
    /// Storage namespace for handlers that persist state.
    pub bucket: Option<String>,
}

/// On-disk shape of a [`TaskSpec`].
#[derive(Serialize, Deserialize)]
struct TaskRecord {
    name: String,
    #[serde(rename = "func")]
    function_id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    headers: Option<Vec<Header>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    store: Option<String>,
    #[serde(
        rename = "responseStruct",
        alias = "response_struct",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    response_struct: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bucket: Option<String>,
}

impl TryFrom<TaskRecord> for TaskSpec {
    type Error = WorkflowError;

    fn try_from(record: TaskRecord) -> Result<Self, Self::Error> {
        let request = match (record.url, record.method, record.headers) {
            (Some(url), method, headers) => Some(RequestDescriptor {
                url,
                method: method.unwrap_or_else(default_method),
                headers: headers.unwrap_or_default(),
            }),
            (None, None, None) => None,
            (None, _, _) => {
                return Err(WorkflowError::MissingField {
                    context: format!("task '{}'", record.name),
                    field: "url",
                })
            }
        };
        Ok(Self {
            name: record.name,
            function_id: record.function_id,
            kind: record.kind,
            event: record.event,
            request,
            store: record.store,
            response_struct: record.response_struct,
            bucket: record.bucket,
        })
    }
}

impl From<TaskSpec> for TaskRecord {
    fn from(task: TaskSpec) -> Self {
        let (url, method, headers) = match task.request {
            Some(request) => (
                Some(request.url),
                Some(request.method),
                (!request.headers.is_empty()).then_some(request.headers),
            ),
            None => (None, None, None),
        };
        Self {
            name: task.name,
            function_id: task.function_id,
            kind: task.kind,
            event: task.event,
            url,
            method,
            headers,
            store: task.store,
            response_struct: task.response_struct,
            bucket: task.bucket,
        }
    }
}

impl TaskSpec {
    /// Creates a task bound to `name` that calls `function_id`.
    pub fn new(name: impl Into<String>, function_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            function_id: function_id.into(),
            kind: None,
            event: None,
            request: None,
            store: None,
            response_struct: None,
            bucket: None,
        }
    }

    /// Sets the emitted event.
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Sets the task whose result this one receives.
    pub fn with_store(mut self, dependency: impl Into<String>) -> Self {
        self.store = Some(dependency.into());
        self
    }

    /// Sets the request payload.
    pub fn with_request(mut self, request: RequestDescriptor) -> Self {
        self.request = Some(request);
        self
    }

    /// Sets the decoding hint.
    pub fn with_response_struct(mut self, name: impl Into<String>) -> Self {
        self.response_struct = Some(name.into());
        self
    }

    /// Sets the storage namespace.
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Returns the event this task emits once it has run.
    pub fn emitted_event(&self) -> &str {
        self.event.as_deref().unwrap_or(&self.name)
    }

    /// Returns the storage namespace, falling back to the task name.
    pub fn bucket(&self) -> &str {
        self.bucket.as_deref().unwrap_or(&self.name)
    }
}

/// Where and how to call a remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    /// Target URL.
    pub url: String,
    /// HTTP method.
    #[serde(default = "default_method")]
    pub method: String,
    /// Request headers, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl RequestDescriptor {
    /// Creates a `GET` request without headers.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: Vec::new(),
        }
    }

    /// Appends a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header {
            name: name.into(),
            value: value.into(),
        });
        self
    }
}

/// A single request header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Header name.
    pub name: String,
    /// Header value, possibly containing `${VAR}` references.
    pub value: String,
}

impl WorkflowDefinition {
    /// Creates an empty definition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    pub fn stage(mut self, name: impl Into<String>) -> Self {
        self.stages.push(name.into());
        self
    }

    /// Appends a transition.
    pub fn transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Appends a task.
    pub fn task(mut self, task: TaskSpec) -> Self {
        self.tasks.push(task);
        self
    }

    /// Returns the task bound to `stage`, if any.
    pub fn find_task(&self, stage: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|task| task.name == stage)
    }

    /// Returns `true` when no transitions are declared and the stage list
    /// alone decides the execution order.
    pub fn is_sequential(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Returns `true` if `state` is reserved, declared as a stage, or bound
    /// to a task.
    pub fn is_known_state(&self, state: &str) -> bool {
        state == START
            || state == END
            || self.stages.iter().any(|stage| stage == state)
            || self.find_task(state).is_some()
    }

    /// Returns the event emitted in the `start` state: the event of a task
    /// bound to `start`, otherwise `start` itself.
    pub fn start_event(&self) -> &str {
        self.find_task(START).map_or(START, TaskSpec::emitted_event)
    }

    /// Returns the distinct function ids referenced by tasks, in definition
    /// order.
    pub fn function_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.tasks
            .iter()
            .map(|task| task.function_id.as_str())
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Checks the definition for mistakes that would make runs
    /// unpredictable.
    ///
    /// # Errors
    ///
    /// Returns the first problem found: an empty name or function id, a
    /// duplicated task or stage, an ambiguous edge, a `store` reference
    /// to a task that does not exist, or transitions none of which leave
    /// `start` on its emitted event.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        let mut stages = HashSet::new();
        for stage in &self.stages {
            if stage.is_empty() {
                return Err(WorkflowError::MissingField {
                    context: "stage list".to_string(),
                    field: "name",
                });
            }
            if !stages.insert(stage.as_str()) {
                return Err(WorkflowError::DuplicateStage {
                    stage: stage.clone(),
                });
            }
        }

        let mut tasks = HashSet::new();
        for (index, task) in self.tasks.iter().enumerate() {
            if task.name.is_empty() {
                return Err(WorkflowError::MissingField {
                    context: format!("task #{}", index + 1),
                    field: "name",
                });
            }
            if task.function_id.is_empty() {
                return Err(WorkflowError::MissingField {
                    context: format!("task '{}'", task.name),
                    field: "func",
                });
            }
            if !tasks.insert(task.name.as_str()) {
                return Err(WorkflowError::DuplicateTask {
                    task: task.name.clone(),
                });
            }
        }

        for task in &self.tasks {
            if let Some(dependency) = &task.store {
                if !tasks.contains(dependency.as_str()) {
                    return Err(WorkflowError::UnknownDependency {
                        task: task.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        let mut edges: HashMap<(&str, &str), &str> = HashMap::new();
        for (index, transition) in self.transitions.iter().enumerate() {
            for (field, value) in [
                ("name", &transition.name),
                ("from", &transition.from),
                ("to", &transition.to),
            ] {
                if value.is_empty() {
                    return Err(WorkflowError::MissingField {
                        context: format!("transition #{}", index + 1),
                        field,
                    });
                }
            }

            let key = (transition.from.as_str(), transition.name.as_str());
            match edges.get(&key) {
                Some(existing) if *existing != transition.to => {
                    return Err(WorkflowError::AmbiguousTransition {
                        from: transition.from.clone(),
                        event: transition.name.clone(),
                        first: (*existing).to_string(),
                        second: transition.to.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    edges.insert(key, transition.to.as_str());
                }
            }
        }

        if !self.is_sequential() {
            let event = self.start_event();
            if !edges.contains_key(&(START, event)) {
                return Err(WorkflowError::UnreachableStart {
                    event: event.to_string(),
                });
            }
        }

        Ok(())
    }
}
