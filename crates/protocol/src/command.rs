//! Outbound commands and their JSON-RPC params.

use std::fmt;

use execution_core::{CommandKind, OrderDraft, OrderSide};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

/// Prefix of channels that require an authenticated session.
pub const PRIVATE_CHANNEL_PREFIX: &str = "user.";

/// Whether a channel must go through `private/subscribe`.
pub fn is_private_channel(channel: &str) -> bool {
    channel.starts_with(PRIVATE_CHANNEL_PREFIX)
}

/// Auth grant sent with `public/auth`.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthGrant {
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
    ClientSignature {
        client_id: String,
        timestamp: i64,
        nonce: String,
        signature: String,
    },
}

impl fmt::Debug for AuthGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .finish(),
            Self::ClientSignature {
                client_id,
                timestamp,
                nonce,
                ..
            } => f
                .debug_struct("ClientSignature")
                .field("client_id", client_id)
                .field("timestamp", timestamp)
                .field("nonce", nonce)
                .field("signature", &"[REDACTED]")
                .finish(),
        }
    }
}

/// `advanced` flag of `private/edit` for options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvancedMode {
    Usd,
    Implv,
}

impl AdvancedMode {
    pub fn from_venue_str(s: &str) -> Option<Self> {
        match s {
            "usd" => Some(Self::Usd),
            "implv" => Some(Self::Implv),
            _ => None,
        }
    }
}

/// Change to an existing order.
#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    /// Id sent on the wire: the venue id when known, else the local id.
    pub order_id: String,
    pub amount: Option<Decimal>,
    pub price: Option<Decimal>,
    pub advanced: Option<AdvancedMode>,
    pub post_only: bool,
    pub reduce_only: bool,
}

/// Every request this client can send.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Authenticate(AuthGrant),
    /// Sent as `private/buy` or `private/sell` depending on the side.
    Place(OrderDraft),
    Cancel { order_id: String },
    Edit(EditRequest),
    OrderHistoryByCurrency { currency: String, count: u32 },
    OrderHistoryByInstrument { instrument: String, count: u32 },
    BookSummaryByInstrument { instrument: String },
    BookSummaryByCurrency { currency: String, kind: Option<String> },
    Ticker { instrument: String },
    /// Instrument lookup, used for its contract size.
    ContractSize { instrument: String },
    Currencies,
    Subscribe { channels: Vec<String> },
    Unsubscribe { channels: Vec<String> },
    UnsubscribeAll,
    SetHeartbeat { interval_secs: u64 },
    /// Reply to a heartbeat test request.
    Test,
}

#[derive(Serialize)]
struct PlaceParams<'a> {
    instrument_name: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    #[serde(rename = "type")]
    order_type: &'static str,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    price: Option<Decimal>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    trigger_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trigger: Option<&'static str>,
    label: &'a str,
}

#[derive(Serialize)]
struct EditParams<'a> {
    order_id: &'a str,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    amount: Option<Decimal>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    advanced: Option<AdvancedMode>,
    post_only: bool,
    reduce_only: bool,
}

#[derive(Serialize)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
enum AuthParams<'a> {
    ClientCredentials {
        client_id: &'a str,
        client_secret: &'a str,
    },
    ClientSignature {
        client_id: &'a str,
        timestamp: i64,
        nonce: &'a str,
        signature: &'a str,
        data: &'a str,
    },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Authenticate(_) => CommandKind::Authenticate,
            Self::Place(_) => CommandKind::Place,
            Self::Cancel { .. } => CommandKind::Cancel,
            Self::Edit(_) => CommandKind::Modify,
            Self::OrderHistoryByCurrency { .. } => CommandKind::OrderHistoryByCurrency,
            Self::OrderHistoryByInstrument { .. } => CommandKind::OrderHistoryByInstrument,
            Self::BookSummaryByInstrument { .. } => CommandKind::BookSummaryByInstrument,
            Self::BookSummaryByCurrency { .. } => CommandKind::BookSummaryByCurrency,
            Self::Ticker { .. } => CommandKind::Ticker,
            Self::ContractSize { .. } => CommandKind::ContractSize,
            Self::Currencies => CommandKind::Currencies,
            Self::Subscribe { .. } => CommandKind::Subscribe,
            Self::Unsubscribe { .. } => CommandKind::Unsubscribe,
            Self::UnsubscribeAll => CommandKind::UnsubscribeAll,
            Self::SetHeartbeat { .. } => CommandKind::SetHeartbeat,
            Self::Test => CommandKind::Test,
        }
    }

    /// JSON-RPC method name.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Authenticate(_) => "public/auth",
            Self::Place(draft) => match draft.side {
                OrderSide::Buy => "private/buy",
                OrderSide::Sell => "private/sell",
            },
            Self::Cancel { .. } => "private/cancel",
            Self::Edit(_) => "private/edit",
            Self::OrderHistoryByCurrency { .. } => "private/get_order_history_by_currency",
            Self::OrderHistoryByInstrument { .. } => "private/get_order_history_by_instrument",
            Self::BookSummaryByInstrument { .. } => "public/get_book_summary_by_instrument",
            Self::BookSummaryByCurrency { .. } => "public/get_book_summary_by_currency",
            Self::Ticker { .. } => "public/ticker",
            Self::ContractSize { .. } => "public/get_instrument",
            Self::Currencies => "public/get_currencies",
            Self::Subscribe { channels } => {
                if channels.iter().any(|c| is_private_channel(c)) {
                    "private/subscribe"
                } else {
                    "public/subscribe"
                }
            }
            Self::Unsubscribe { channels } => {
                if channels.iter().any(|c| is_private_channel(c)) {
                    "private/unsubscribe"
                } else {
                    "public/unsubscribe"
                }
            }
            Self::UnsubscribeAll => "public/unsubscribe_all",
            Self::SetHeartbeat { .. } => "public/set_heartbeat",
            Self::Test => "public/test",
        }
    }

    /// Local order id this command targets, if any.
    pub fn order_id(&self) -> Option<&str> {
        match self {
            Self::Place(draft) => Some(&draft.order_id),
            _ => None,
        }
    }

    /// Request params as JSON.
    pub fn params(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Authenticate(grant) => {
                let data = "";
                let params = match grant {
                    AuthGrant::ClientCredentials {
                        client_id,
                        client_secret,
                    } => AuthParams::ClientCredentials {
                        client_id,
                        client_secret,
                    },
                    AuthGrant::ClientSignature {
                        client_id,
                        timestamp,
                        nonce,
                        signature,
                    } => AuthParams::ClientSignature {
                        client_id,
                        timestamp: *timestamp,
                        nonce,
                        signature,
                        data,
                    },
                };
                serde_json::to_value(params)
            }
            Self::Place(draft) => serde_json::to_value(PlaceParams {
                instrument_name: &draft.instrument,
                amount: draft.amount,
                order_type: draft.kind.as_venue_str(),
                price: draft.price,
                trigger_price: draft.trigger_price,
                trigger: draft.trigger.map(|t| t.as_venue_str()),
                // The client id doubles as label so events can be matched
                // before the venue id is known.
                label: draft.label.as_deref().unwrap_or(draft.order_id.as_str()),
            }),
            Self::Cancel { order_id } => Ok(serde_json::json!({ "order_id": order_id })),
            Self::Edit(edit) => serde_json::to_value(EditParams {
                order_id: &edit.order_id,
                amount: edit.amount,
                price: edit.price,
                advanced: edit.advanced,
                post_only: edit.post_only,
                reduce_only: edit.reduce_only,
            }),
            Self::OrderHistoryByCurrency { currency, count } => {
                Ok(serde_json::json!({ "currency": currency, "count": count }))
            }
            Self::OrderHistoryByInstrument { instrument, count } => {
                Ok(serde_json::json!({ "instrument_name": instrument, "count": count }))
            }
            Self::BookSummaryByInstrument { instrument }
            | Self::Ticker { instrument }
            | Self::ContractSize { instrument } => {
                Ok(serde_json::json!({ "instrument_name": instrument }))
            }
            Self::BookSummaryByCurrency { currency, kind } => Ok(match kind {
                Some(kind) => serde_json::json!({ "currency": currency, "kind": kind }),
                None => serde_json::json!({ "currency": currency }),
            }),
            Self::Subscribe { channels } | Self::Unsubscribe { channels } => {
                Ok(serde_json::json!({ "channels": channels }))
            }
            Self::SetHeartbeat { interval_secs } => {
                Ok(serde_json::json!({ "interval": interval_secs }))
            }
            Self::Currencies | Self::UnsubscribeAll | Self::Test => Ok(serde_json::json!({})),
        }
    }
}
