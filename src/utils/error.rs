use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("io: {path}: {source}")]
    FileError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid configuration value for '{field}' ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("modules: {what} not found: {path}")]
    NotFound { what: String, path: String },

    #[error("modules: {file}:{line}: {message}")]
    SyntaxError {
        file: PathBuf,
        line: usize,
        message: String,
    },

    #[error("modules: {path}: {source}")]
    ModuleError {
        path: String,
        #[source]
        source: Box<GenError>,
    },

    #[error("sources: {file}: {message}")]
    SourceError { file: PathBuf, message: String },

    #[error("annotations: {message}")]
    AnnotationError { message: String },

    #[error("types: {path}.{name}: {source}")]
    TypeError {
        path: String,
        name: String,
        #[source]
        source: Box<GenError>,
    },

    #[error("types: field {field} (#{index}): {source}")]
    FieldError {
        field: String,
        index: usize,
        #[source]
        source: Box<GenError>,
    },

    #[error("types: {message}")]
    ResolveError { message: String },

    #[error("types: map key must be a basic type, got {key}")]
    MapKeyError { key: String },

    #[error("types: pack missed, no argument bound to paradigm {name}")]
    PackMissed { name: String },

    #[error("functions: {function}: {message}")]
    FunctionError { function: String, message: String },

    #[error("services: {service}: {message}")]
    ServiceError { service: String, message: String },

    #[error("render: {0}")]
    RenderError(#[from] minijinja::Error),

    #[error("process: step {step} failed, {failed} of {total} units failed")]
    StepFailed {
        step: String,
        failed: usize,
        total: usize,
    },

    #[error("process: unit {unit} panicked: {message}")]
    UnitPanicked { unit: String, message: String },

    #[error("process: unit {unit} did not complete: {message}")]
    UnitInterrupted { unit: String, message: String },

    #[error("process: aborted")]
    Aborted,

    #[error("process: abort timed out after {0:?}")]
    AbortTimeout(Duration),

    #[error(transparent)]
    Shared(Arc<GenError>),
}

pub type Result<T> = std::result::Result<T, GenError>;

/// Error taxonomy used for reporting and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or malformed declaration files, invalid workspace references.
    Configuration,
    /// Function signatures or declarations violating generator conventions.
    Shape,
    /// Types that cannot be found or specialized.
    Resolution,
    /// Cancellation, abort timeouts and unit panics.
    Concurrency,
    /// Filesystem, serialization and rendering failures.
    System,
}

impl GenError {
    pub fn module(path: impl Into<String>, source: GenError) -> Self {
        GenError::ModuleError {
            path: path.into(),
            source: Box::new(source),
        }
    }

    pub fn not_found(what: impl Into<String>, path: impl Into<String>) -> Self {
        GenError::NotFound {
            what: what.into(),
            path: path.into(),
        }
    }

    pub fn resolve(message: impl Into<String>) -> Self {
        GenError::ResolveError {
            message: message.into(),
        }
    }

    pub fn function(function: impl Into<String>, message: impl Into<String>) -> Self {
        GenError::FunctionError {
            function: function.into(),
            message: message.into(),
        }
    }

    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GenError::FileError {
            path: path.into(),
            source,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            GenError::ConfigError { .. }
            | GenError::InvalidConfigValueError { .. }
            | GenError::NotFound { .. }
            | GenError::SyntaxError { .. }
            | GenError::SourceError { .. } => ErrorCategory::Configuration,
            GenError::ModuleError { source, .. } => match source.category() {
                ErrorCategory::System => ErrorCategory::System,
                _ => ErrorCategory::Configuration,
            },
            GenError::AnnotationError { .. }
            | GenError::FunctionError { .. }
            | GenError::ServiceError { .. } => ErrorCategory::Shape,
            GenError::TypeError { source, .. } | GenError::FieldError { source, .. } => {
                match source.category() {
                    ErrorCategory::Shape => ErrorCategory::Shape,
                    ErrorCategory::System => ErrorCategory::System,
                    _ => ErrorCategory::Resolution,
                }
            }
            GenError::ResolveError { .. }
            | GenError::MapKeyError { .. }
            | GenError::PackMissed { .. } => ErrorCategory::Resolution,
            GenError::StepFailed { .. }
            | GenError::UnitPanicked { .. }
            | GenError::UnitInterrupted { .. }
            | GenError::Aborted
            | GenError::AbortTimeout(_) => ErrorCategory::Concurrency,
            GenError::Shared(inner) => inner.category(),
            GenError::IoError(_)
            | GenError::FileError { .. }
            | GenError::SerializationError(_)
            | GenError::RenderError(_) => ErrorCategory::System,
        }
    }

    /// Reports whether this error is (or wraps) a cooperative cancellation.
    pub fn is_aborted(&self) -> bool {
        match self {
            GenError::Aborted => true,
            GenError::Shared(inner) => inner.is_aborted(),
            GenError::ModuleError { source, .. }
            | GenError::TypeError { source, .. }
            | GenError::FieldError { source, .. } => source.is_aborted(),
            _ => false,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Project configuration problem: {}", self),
            ErrorCategory::Shape => format!("Declaration does not follow generator conventions: {}", self),
            ErrorCategory::Resolution => format!("Type could not be resolved: {}", self),
            ErrorCategory::Concurrency if self.is_aborted() => "Generation was aborted".to_string(),
            ErrorCategory::Concurrency => format!("Generation did not complete: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => {
                "Check go.mod / go.work and make sure required modules are downloaded (go mod download)"
            }
            ErrorCategory::Shape => {
                "Annotated functions must be unexported, take context.Context first and return error last"
            }
            ErrorCategory::Resolution => {
                "Make sure referenced types exist, map keys are basic types and generic arguments are complete"
            }
            ErrorCategory::Concurrency => "Re-run the generator; use --verbose to see which unit stalled",
            ErrorCategory::System => "Check file permissions and free disk space",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Configuration => 2,
            ErrorCategory::Shape | ErrorCategory::Resolution => 1,
            ErrorCategory::Concurrency => 4,
            ErrorCategory::System => 3,
        }
    }
}
