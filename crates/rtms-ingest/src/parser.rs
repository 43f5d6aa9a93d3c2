//! Response parser for the transaction API
//!
//! Response layout:
//!
//! ```xml
//! <response>
//!   <header><resultCode>000</resultCode><resultMsg>OK</resultMsg></header>
//!   <body>
//!     <items>
//!       <item><dealAmount>50,000</dealAmount><dealYear>2025</dealYear>...</item>
//!     </items>
//!     <numOfRows>1000</numOfRows><pageNo>1</pageNo><totalCount>1</totalCount>
//!   </body>
//! </response>
//! ```
//!
//! The gateway in front of the API answers credential problems with a different
//! envelope (`cmmMsgHeader/returnReasonCode`), which is read as a result code too.
//!
//! Items are not bound to a fixed schema: every child element of an `<item>` becomes a
//! field, so columns added by the upstream over time are captured as they appear.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::{ApiErrorClass, FetchError};
use crate::models::TransactionRecord;

/// Result codes that mean "success" when no policy is configured
pub const DEFAULT_SUCCESS_CODES: &[&str] = &["00", "000"];

/// Result codes that mean "no data for this unit" when no policy is configured
pub const DEFAULT_NO_DATA_CODES: &[&str] = &["03", "99"];

/// Result codes reported for credential or permission problems
pub const DEFAULT_CREDENTIAL_CODES: &[&str] = &["20", "30", "31", "32"];

/// The payload could not be interpreted; retrying will not help
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct MalformedPayload(pub String);

impl From<MalformedPayload> for FetchError {
    fn from(err: MalformedPayload) -> Self {
        FetchError::MalformedPayload(err.0)
    }
}

/// Mapping from raw result code to outcome
///
/// Deployments of the API disagree on their numbering scheme, so the mapping is
/// configuration rather than a constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultCodePolicy {
    pub success: Vec<String>,
    pub no_data: Vec<String>,
    pub credential: Vec<String>,
}

impl Default for ResultCodePolicy {
    fn default() -> Self {
        let owned =
            |codes: &[&str]| -> Vec<String> { codes.iter().map(|c| c.to_string()).collect() };
        Self {
            success: owned(DEFAULT_SUCCESS_CODES),
            no_data: owned(DEFAULT_NO_DATA_CODES),
            credential: owned(DEFAULT_CREDENTIAL_CODES),
        }
    }
}

impl ResultCodePolicy {
    pub fn classify(&self, code: &str, message: &str) -> ResponseStatus {
        let code = code.trim();
        let matches = |codes: &[String]| codes.iter().any(|c| c == code);

        if matches(&self.success) {
            ResponseStatus::Success
        } else if matches(&self.no_data) {
            ResponseStatus::NoData
        } else {
            let class = if matches(&self.credential) {
                ApiErrorClass::Credential
            } else {
                ApiErrorClass::Unknown
            };
            ResponseStatus::ApiError {
                code: code.to_string(),
                message: message.to_string(),
                class,
            }
        }
    }
}

/// Outcome carried by a well-formed response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseStatus {
    Success,
    NoData,
    ApiError {
        code: String,
        message: String,
        class: ApiErrorClass,
    },
}

/// A well-formed response page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub status: ResponseStatus,
    /// Items on this page; always empty unless `status` is `Success`
    pub records: Vec<TransactionRecord>,
    pub total_count: Option<u64>,
}

/// Parses response pages according to a [`ResultCodePolicy`]
#[derive(Debug, Clone, Default)]
pub struct ResponseParser {
    policy: ResultCodePolicy,
}

#[derive(Default)]
struct Envelope {
    result_code: Option<String>,
    result_message: Option<String>,
    total_count: Option<String>,
    records: Vec<TransactionRecord>,
}

impl ResponseParser {
    pub fn new(policy: ResultCodePolicy) -> Self {
        Self { policy }
    }

    pub fn parse(&self, body: &str) -> Result<ParsedResponse, MalformedPayload> {
        let envelope = read_envelope(body)?;

        let code = envelope
            .result_code
            .ok_or_else(|| MalformedPayload("response carries no result code".to_string()))?;
        let message = envelope.result_message.unwrap_or_default();
        let status = self.policy.classify(&code, &message);

        let total_count = match envelope.total_count {
            Some(raw) if !raw.is_empty() => Some(raw.parse::<u64>().map_err(|_| {
                MalformedPayload(format!("totalCount is not a number: '{raw}'"))
            })?),
            _ => None,
        };

        let records = if status == ResponseStatus::Success {
            envelope.records
        } else {
            Vec::new()
        };

        debug!(code = %code, items = records.len(), "Parsed response page");

        Ok(ParsedResponse {
            status,
            records,
            total_count,
        })
    }
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn ends_with(path: &[String], suffix: &[&str]) -> bool {
    path.len() >= suffix.len()
        && path[path.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a.as_str() == *b)
}

fn read_envelope(body: &str) -> Result<Envelope, MalformedPayload> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut envelope = Envelope::default();
    let mut path: Vec<String> = Vec::new();
    let mut saw_root = false;

    // Depth of the open <item>, its collected fields, and the field being read
    let mut item_depth: Option<usize> = None;
    let mut item_fields: Vec<(String, String)> = Vec::new();
    let mut field: Option<(String, String)> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            MalformedPayload(format!("XML error at byte {}: {}", reader.error_position(), e))
        })?;

        match event {
            Event::Start(start) => {
                let name = local_name(start.local_name().as_ref());
                saw_root = true;
                path.push(name.clone());

                match item_depth {
                    Some(depth) if path.len() == depth + 1 => {
                        field = Some((name, String::new()));
                    },
                    None if ends_with(&path, &["items", "item"]) => {
                        item_depth = Some(path.len());
                        item_fields.clear();
                    },
                    _ => {},
                }
            },
            Event::Empty(empty) => {
                let name = local_name(empty.local_name().as_ref());
                saw_root = true;

                match item_depth {
                    Some(depth) if path.len() == depth => {
                        item_fields.push((name, String::new()));
                    },
                    None if name == "item" && ends_with(&path, &["items"]) => {
                        envelope.records.push(TransactionRecord::default());
                    },
                    _ => {},
                }
            },
            Event::Text(text) => {
                let value = text
                    .unescape()
                    .map_err(|e| MalformedPayload(format!("bad text content: {e}")))?;
                absorb_text(&mut envelope, &path, field.as_mut(), &value);
            },
            Event::CData(cdata) => {
                let value = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                absorb_text(&mut envelope, &path, field.as_mut(), &value);
            },
            Event::End(_) => {
                match item_depth {
                    Some(depth) if path.len() == depth + 1 => {
                        if let Some(done) = field.take() {
                            item_fields.push(done);
                        }
                    },
                    Some(depth) if path.len() == depth => {
                        envelope
                            .records
                            .push(TransactionRecord::from_fields(item_fields.drain(..)));
                        item_depth = None;
                    },
                    _ => {},
                }
                path.pop();
            },
            Event::Eof => break,
            _ => {},
        }
    }

    if !saw_root {
        return Err(MalformedPayload("response body contains no XML element".to_string()));
    }
    if !path.is_empty() {
        return Err(MalformedPayload(format!(
            "document ended inside <{}>",
            path.join("/")
        )));
    }

    Ok(envelope)
}

fn absorb_text(
    envelope: &mut Envelope,
    path: &[String],
    field: Option<&mut (String, String)>,
    value: &str,
) {
    if let Some((_, buffer)) = field {
        buffer.push_str(value);
        return;
    }

    let set = |slot: &mut Option<String>| {
        if slot.is_none() {
            *slot = Some(value.trim().to_string());
        }
    };

    if ends_with(path, &["header", "resultCode"])
        || ends_with(path, &["cmmMsgHeader", "returnReasonCode"])
    {
        set(&mut envelope.result_code);
    } else if ends_with(path, &["header", "resultMsg"])
        || ends_with(path, &["cmmMsgHeader", "returnAuthMsg"])
        || ends_with(path, &["cmmMsgHeader", "errMsg"])
    {
        set(&mut envelope.result_message);
    } else if ends_with(path, &["body", "totalCount"]) {
        set(&mut envelope.total_count);
    }
}
