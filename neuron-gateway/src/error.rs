//! The gateway's closed error taxonomy (§7).
//!
//! Every leaf error in the process is eventually wrapped into a
//! [`GatewayError`] carrying a stable code, a severity, a recoverability
//! flag, and a context record, then rendered one of three ways: XML for
//! tool-result contexts, JSON for HTTP responses, or a structured value
//! for `/api/logs`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// How severe an error is, independent of whether it's recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Logged, no user-facing effect.
    Low,
    /// Degrades one request; the process is otherwise healthy.
    Medium,
    /// Degrades a whole subsystem (e.g. the memory store is down).
    High,
    /// The process cannot continue serving requests.
    Fatal,
}

/// Where and during what operation an error occurred.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayErrorContext {
    /// The component the error originated in (`"memory"`, `"router"`, ...).
    pub component: &'static str,
    /// The operation being performed (`"put_global"`, `"resolve"`, ...).
    pub operation: &'static str,
    /// Free-form extra detail, when available.
    pub details: Option<String>,
}

impl GatewayErrorContext {
    /// Build a context record with no extra detail.
    #[must_use]
    pub fn new(component: &'static str, operation: &'static str) -> Self {
        Self {
            component,
            operation,
            details: None,
        }
    }

    /// Attach free-form detail to this context.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// The closed set of error codes named in §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayErrorCode {
    /// The memory store failed to open.
    DatabaseInit,
    /// The memory store is busy (lock contention).
    DatabaseBusy,
    /// The memory store's on-disk data is corrupt.
    DatabaseCorrupt,
    /// A memory record or embedding failed to persist.
    MemorySaveFailed,
    /// A memory recall query failed.
    MemoryRecallFailed,
    /// The embedding provider returned an API error.
    EmbeddingApiError,
    /// The embedding provider rate-limited the request.
    EmbeddingRateLimited,
    /// The embedding provider was unreachable.
    EmbeddingNetworkError,
    /// The context builder could not fit required sections within budget.
    ContextBudgetOverflow,
    /// A sub-agent call exceeded the configured maximum depth.
    SubAgentDepthExceeded,
    /// A sub-agent's nested request failed.
    SubAgentExecutionFailed,
    /// The routing engine had no rule to fall back on.
    RouterFailedSelection,
    /// The upstream provider rate-limited the request.
    ApiRateLimited,
    /// The upstream provider rejected credentials.
    ApiAuthFailed,
    /// The upstream provider timed out.
    ApiTimeout,
    /// A tool definition failed structural validation.
    ToolValidationFailed,
    /// A tool call's arguments could not be translated to the target dialect.
    ToolTransformationFailed,
    /// The response stream closed before completion.
    StreamPrematureClose,
    /// General request validation failure.
    ValidationError,
    /// Anything not otherwise classified.
    InternalError,
}

impl GatewayErrorCode {
    /// The code's wire string, as used in JSON responses and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DatabaseInit => "DATABASE_INIT",
            Self::DatabaseBusy => "DATABASE_BUSY",
            Self::DatabaseCorrupt => "DATABASE_CORRUPT",
            Self::MemorySaveFailed => "MEMORY_SAVE_FAILED",
            Self::MemoryRecallFailed => "MEMORY_RECALL_FAILED",
            Self::EmbeddingApiError => "EMBEDDING_API_ERROR",
            Self::EmbeddingRateLimited => "EMBEDDING_RATE_LIMITED",
            Self::EmbeddingNetworkError => "EMBEDDING_NETWORK_ERROR",
            Self::ContextBudgetOverflow => "CONTEXT_BUDGET_OVERFLOW",
            Self::SubAgentDepthExceeded => "SUBAGENT_DEPTH_EXCEEDED",
            Self::SubAgentExecutionFailed => "SUBAGENT_EXECUTION_FAILED",
            Self::RouterFailedSelection => "ROUTER_FAILED_SELECTION",
            Self::ApiRateLimited => "API_RATE_LIMITED",
            Self::ApiAuthFailed => "API_AUTH_FAILED",
            Self::ApiTimeout => "API_TIMEOUT",
            Self::ToolValidationFailed => "TOOL_VALIDATION_FAILED",
            Self::ToolTransformationFailed => "TOOL_TRANSFORMATION_FAILED",
            Self::StreamPrematureClose => "STREAM_PREMATURE_CLOSE",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    fn http_status(self) -> StatusCode {
        match self {
            Self::ToolValidationFailed | Self::ValidationError => StatusCode::BAD_REQUEST,
            Self::ApiAuthFailed => StatusCode::UNAUTHORIZED,
            Self::ApiRateLimited | Self::EmbeddingRateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::ApiTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::SubAgentDepthExceeded => StatusCode::CONFLICT,
            Self::DatabaseBusy => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::DatabaseCorrupt | Self::DatabaseInit => ErrorSeverity::Fatal,
            Self::MemorySaveFailed
            | Self::MemoryRecallFailed
            | Self::EmbeddingApiError
            | Self::EmbeddingNetworkError
            | Self::SubAgentExecutionFailed
            | Self::RouterFailedSelection
            | Self::StreamPrematureClose => ErrorSeverity::High,
            Self::ContextBudgetOverflow
            | Self::EmbeddingRateLimited
            | Self::ApiRateLimited
            | Self::ApiTimeout
            | Self::SubAgentDepthExceeded
            | Self::DatabaseBusy => ErrorSeverity::Medium,
            Self::ToolValidationFailed | Self::ToolTransformationFailed | Self::ValidationError => {
                ErrorSeverity::Low
            }
            Self::ApiAuthFailed | Self::InternalError => ErrorSeverity::High,
        }
    }
}

/// A fully-formed gateway error: stable code, severity, recoverability,
/// a context record, and zero or more recovery suggestions.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}", code = self.code.as_str())]
pub struct GatewayError {
    /// The stable error code.
    pub code: GatewayErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Overrides the code's default severity when set.
    pub severity: Option<ErrorSeverity>,
    /// Whether the caller may retry or otherwise recover.
    pub recoverable: bool,
    /// Where and during what operation this occurred.
    pub context: GatewayErrorContext,
    /// Suggestions for recovering, surfaced in logs and the JSON rendering.
    pub suggestions: Vec<String>,
}

impl GatewayError {
    /// Build an error with the code's default severity and no suggestions.
    #[must_use]
    pub fn new(
        code: GatewayErrorCode,
        message: impl Into<String>,
        context: GatewayErrorContext,
        recoverable: bool,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            severity: None,
            recoverable,
            context,
            suggestions: Vec::new(),
        }
    }

    /// Attach recovery suggestions.
    #[must_use]
    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    /// This error's effective severity (explicit override or the code's default).
    #[must_use]
    pub fn severity(&self) -> ErrorSeverity {
        self.severity.unwrap_or_else(|| self.code.default_severity())
    }

    /// Render as the `<error code="…"><message>…</message></error>` XML
    /// element used in tool-result contexts (§7 user-visible rendering).
    ///
    /// Minimal hand-rolled escaping rather than a dependency: this is the
    /// only XML the gateway ever emits.
    #[must_use]
    pub fn to_xml(&self) -> String {
        fn escape(s: &str) -> String {
            s.replace('&', "&amp;")
                .replace('<', "&lt;")
                .replace('>', "&gt;")
                .replace('"', "&quot;")
        }
        let mut out = format!(
            "<error code=\"{}\"><message>{}</message>",
            self.code.as_str(),
            escape(&self.message)
        );
        for suggestion in &self.suggestions {
            out.push_str(&format!("<suggestion>{}</suggestion>", escape(suggestion)));
        }
        out.push_str("</error>");
        out
    }

    /// Render as the `{error:{type,message,details?}}` JSON body §7
    /// specifies for API responses.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "type": self.code.as_str(),
                "message": self.message,
                "details": self.context.details,
            }
        })
    }

    /// Render as a structured value for `/api/logs` and `tracing` fields.
    #[must_use]
    pub fn to_structured(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code.as_str(),
            "message": self.message,
            "severity": self.severity(),
            "recoverable": self.recoverable,
            "component": self.context.component,
            "operation": self.context.operation,
            "details": self.context.details,
            "suggestions": self.suggestions,
        })
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.code.http_status();
        tracing::warn!(
            code = self.code.as_str(),
            severity = ?self.severity(),
            component = self.context.component,
            operation = self.context.operation,
            "request failed"
        );
        (status, axum::Json(self.to_json())).into_response()
    }
}
