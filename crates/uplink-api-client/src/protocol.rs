//! Wire envelopes of the collection API and their interpretation.
//!
//! Every response is a `{code, ...}` envelope where `code == 200` means
//! success regardless of the HTTP status. Interpretation is kept in pure
//! functions over (status, body) so the protocol handling is testable
//! without a server.

use serde::{Deserialize, Serialize};

use uplink_core::UplinkError;

/// Envelope code signalling success.
pub const SUCCESS_CODE: i64 = 200;

pub const TOKEN_PATH: &str = "/token/grant";
pub const UPLOAD_PATH: &str = "/dc/api/v1/collection/retail";

/// `POST /token/grant` response.
#[derive(Debug, Deserialize)]
pub struct TokenGrant {
    pub code: i64,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
}

/// Per-record outcome inside an upload envelope. `soureId` is the
/// server's spelling; its correlation to the submitted `itemId` is
/// positional, not guaranteed verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub soure_id: String,
    pub code: String,
    pub msg: String,
}

/// `POST /dc/api/v1/collection/retail` response.
#[derive(Debug, Deserialize)]
pub struct UploadEnvelope {
    pub code: i64,
    #[serde(default)]
    pub content: Vec<RecordOutcome>,
    #[serde(default)]
    pub msg: Option<String>,
}

/// Accepted batch: the server's per-record outcomes plus how many
/// records we actually submitted, so callers can spot arity mismatches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub outcomes: Vec<RecordOutcome>,
    pub submitted: usize,
}

impl UploadReceipt {
    /// Server returned a different number of outcomes than records sent.
    pub fn arity_mismatch(&self) -> bool {
        self.outcomes.len() != self.submitted
    }

    /// Operator-facing summary of the per-record outcomes.
    pub fn summary(&self) -> String {
        self.outcomes
            .iter()
            .map(|o| format!("{}: {} {}", o.soure_id, o.code, o.msg))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn snippet(body: &str) -> String {
    const MAX: usize = 200;
    let trimmed = body.trim();
    if trimmed.len() <= MAX {
        trimmed.to_string()
    } else {
        let cut = trimmed
            .char_indices()
            .take_while(|(i, _)| *i < MAX)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}...", &trimmed[..cut])
    }
}

/// Interpret a token-grant response. Success requires HTTP 200 *and*
/// envelope code 200 *and* a token; anything else is an auth failure
/// carrying the server-reported reason when there is one.
pub fn interpret_login(status: u16, body: &str) -> Result<String, UplinkError> {
    if status != 200 {
        return Err(UplinkError::Auth(format!(
            "HTTP {}: {}",
            status,
            snippet(body)
        )));
    }

    let grant: TokenGrant = serde_json::from_str(body)
        .map_err(|_| UplinkError::Auth(format!("unexpected login response: {}", snippet(body))))?;

    if grant.code != SUCCESS_CODE {
        let reason = grant
            .msg
            .unwrap_or_else(|| format!("server code {}", grant.code));
        return Err(UplinkError::Auth(reason));
    }
    grant
        .token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| UplinkError::Auth("login succeeded but no token returned".to_string()))
}

/// Interpret an upload response. The raw body travels along as
/// `detail` on failure so the run history can preserve the server's
/// diagnostic payload.
pub fn interpret_upload(
    status: u16,
    body: &str,
    submitted: usize,
) -> Result<UploadReceipt, UplinkError> {
    if status != 200 {
        return Err(UplinkError::Upload {
            message: format!("HTTP {}", status),
            detail: Some(body.to_string()),
        });
    }

    let envelope: UploadEnvelope =
        serde_json::from_str(body).map_err(|_| UplinkError::Upload {
            message: format!("unexpected upload response: {}", snippet(body)),
            detail: Some(body.to_string()),
        })?;

    if envelope.code != SUCCESS_CODE {
        return Err(UplinkError::Upload {
            message: envelope
                .msg
                .unwrap_or_else(|| format!("server code {}", envelope.code)),
            detail: Some(body.to_string()),
        });
    }

    Ok(UploadReceipt {
        outcomes: envelope.content,
        submitted,
    })
}
