use crate::error::AppError;
use crate::feed::types::{lenient, ClientPnl, CommandAck, CommandKind, OrderBookLevel, Trade};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use simd_json::OwnedValue;

/// Every inbound frame kind the venue emits. Kinds this client does not know
/// about land in [`FeedMessage::Unrecognized`] and are dropped by the router.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Welcome {
        message: Option<String>,
    },
    AuthResponse {
        success: Option<bool>,
        message: Option<String>,
    },
    AllPnl {
        clients: Vec<ClientPnl>,
        pushed: bool,
    },
    OrderBookSnapshot {
        bids: Vec<OrderBookLevel>,
        asks: Vec<OrderBookLevel>,
    },
    TradeHistory {
        trades: Vec<Trade>,
    },
    Trade(Trade),
    Execution {
        order_id: Option<u64>,
    },
    Error {
        message: String,
    },
    RealizedPnl {
        pnl: Option<f64>,
    },
    UnrealizedPnl {
        pnl: Option<f64>,
    },
    OpenOrdersCount {
        count: Option<u64>,
    },
    CommandAck(CommandAck),
    Unrecognized {
        kind: String,
    },
}

impl FeedMessage {
    pub fn kind(&self) -> &str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::AuthResponse { .. } => "auth_response",
            Self::AllPnl { pushed: false, .. } => "all_pnl_response",
            Self::AllPnl { pushed: true, .. } => "all_pnl_push",
            Self::OrderBookSnapshot { .. } => "order_book_snapshot_response",
            Self::TradeHistory { .. } => "trade_history_response",
            Self::Trade(_) => "trade",
            Self::Execution { .. } => "execution",
            Self::Error { .. } => "error",
            Self::RealizedPnl { .. } => "realized_pnl_response",
            Self::UnrealizedPnl { .. } => "unrealized_pnl_response",
            Self::OpenOrdersCount { .. } => "open_orders_count_response",
            Self::CommandAck(ack) => match ack.kind {
                CommandKind::Submit => "submit_response",
                CommandKind::Cancel => "cancel_response",
                CommandKind::Modify => "modify_response",
                CommandKind::OrderStatus => "order_status_response",
            },
            Self::Unrecognized { kind } => kind,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MessageText {
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AuthResponseWire {
    success: Option<bool>,
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AllPnlWire {
    #[serde(deserialize_with = "lenient::records")]
    clients: Vec<ClientPnl>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OrderBookWire {
    #[serde(deserialize_with = "lenient::records")]
    bids: Vec<OrderBookLevel>,
    #[serde(deserialize_with = "lenient::records")]
    asks: Vec<OrderBookLevel>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TradeHistoryWire {
    #[serde(deserialize_with = "lenient::records")]
    trades: Vec<Trade>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExecutionWire {
    #[serde(deserialize_with = "lenient::opt_u64")]
    order_id: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PnlWire {
    #[serde(deserialize_with = "lenient::opt_f64")]
    pnl: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CountWire {
    #[serde(deserialize_with = "lenient::opt_u64")]
    count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommandAckWire {
    success: Option<bool>,
    #[serde(deserialize_with = "lenient::opt_u64")]
    id: Option<u64>,
    #[serde(deserialize_with = "lenient::opt_i64")]
    status: Option<i64>,
    message: Option<String>,
}

impl CommandAckWire {
    fn into_ack(self, kind: CommandKind) -> CommandAck {
        // order_status_response omits `success` on the happy path
        let success = self
            .success
            .unwrap_or(kind == CommandKind::OrderStatus && self.status.is_some());
        CommandAck {
            kind,
            success,
            order_id: self.id,
            status: self.status,
            message: self.message,
        }
    }
}

fn payload<T: DeserializeOwned>(value: OwnedValue) -> Result<T, AppError> {
    Ok(simd_json::serde::from_owned_value(value)?)
}

fn message_kind(value: &OwnedValue) -> Option<String> {
    match value {
        OwnedValue::Object(fields) => match fields.get("type") {
            Some(OwnedValue::String(kind)) => Some(kind.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Parses one candidate JSON document into a typed message.
///
/// Documents without a string `type` tag, including bare arrays, decode as
/// `Unrecognized` with an empty kind. Only malformed JSON or a payload whose
/// shape contradicts its kind is an error.
pub fn decode_message(candidate: String) -> Result<FeedMessage, AppError> {
    let mut bytes = candidate.into_bytes();
    let value = simd_json::to_owned_value(bytes.as_mut_slice())?;
    let Some(kind) = message_kind(&value) else {
        return Ok(FeedMessage::Unrecognized {
            kind: String::new(),
        });
    };

    let message = match kind.as_str() {
        "welcome" => FeedMessage::Welcome {
            message: payload::<MessageText>(value)?.message,
        },
        "auth_response" => {
            let wire: AuthResponseWire = payload(value)?;
            FeedMessage::AuthResponse {
                success: wire.success,
                message: wire.message,
            }
        }
        "all_pnl_response" | "all_pnl_push" => FeedMessage::AllPnl {
            clients: payload::<AllPnlWire>(value)?.clients,
            pushed: kind == "all_pnl_push",
        },
        "order_book_snapshot_response" => {
            let wire: OrderBookWire = payload(value)?;
            FeedMessage::OrderBookSnapshot {
                bids: wire.bids,
                asks: wire.asks,
            }
        }
        "trade_history_response" => FeedMessage::TradeHistory {
            trades: payload::<TradeHistoryWire>(value)?.trades,
        },
        "trade" => FeedMessage::Trade(payload(value)?),
        "execution" => FeedMessage::Execution {
            order_id: payload::<ExecutionWire>(value)?.order_id,
        },
        "error" => FeedMessage::Error {
            message: payload::<MessageText>(value)?
                .message
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| "error".to_string()),
        },
        "realized_pnl_response" => FeedMessage::RealizedPnl {
            pnl: payload::<PnlWire>(value)?.pnl,
        },
        "unrealized_pnl_response" => FeedMessage::UnrealizedPnl {
            pnl: payload::<PnlWire>(value)?.pnl,
        },
        "open_orders_count_response" => FeedMessage::OpenOrdersCount {
            count: payload::<CountWire>(value)?.count,
        },
        "submit_response" => {
            FeedMessage::CommandAck(payload::<CommandAckWire>(value)?.into_ack(CommandKind::Submit))
        }
        "cancel_response" => {
            FeedMessage::CommandAck(payload::<CommandAckWire>(value)?.into_ack(CommandKind::Cancel))
        }
        "modify_response" => {
            FeedMessage::CommandAck(payload::<CommandAckWire>(value)?.into_ack(CommandKind::Modify))
        }
        "order_status_response" => FeedMessage::CommandAck(
            payload::<CommandAckWire>(value)?.into_ack(CommandKind::OrderStatus),
        ),
        _ => FeedMessage::Unrecognized { kind },
    };

    Ok(message)
}

/// Client → venue frames. `corr` values are opaque and echoed by nothing this
/// client depends on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundRequest {
    #[serde(rename = "auth")]
    Auth { token: String },
    #[serde(rename = "getAllPnL")]
    GetAllPnl {
        #[serde(skip_serializing_if = "Option::is_none")]
        corr: Option<u64>,
    },
    #[serde(rename = "getOrderBookSnapshot")]
    GetOrderBookSnapshot {
        #[serde(skip_serializing_if = "Option::is_none")]
        corr: Option<u64>,
    },
    #[serde(rename = "getTradeHistory")]
    GetTradeHistory {
        #[serde(skip_serializing_if = "Option::is_none")]
        corr: Option<u64>,
    },
    #[serde(rename = "getRealizedPnL")]
    GetRealizedPnl,
    #[serde(rename = "getUnrealizedPnL")]
    GetUnrealizedPnl,
    #[serde(rename = "getOpenOrdersCount")]
    GetOpenOrdersCount,
    #[serde(rename = "submit")]
    Submit { price: f64, qty: u32, is_buy: bool },
    #[serde(rename = "cancel")]
    Cancel { id: u64 },
    #[serde(rename = "modify")]
    Modify { id: u64, price: f64, qty: u32 },
    #[serde(rename = "getOrderStatus")]
    GetOrderStatus { id: u64 },
}

impl OutboundRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::GetAllPnl { .. } => "getAllPnL",
            Self::GetOrderBookSnapshot { .. } => "getOrderBookSnapshot",
            Self::GetTradeHistory { .. } => "getTradeHistory",
            Self::GetRealizedPnl => "getRealizedPnL",
            Self::GetUnrealizedPnl => "getUnrealizedPnL",
            Self::GetOpenOrdersCount => "getOpenOrdersCount",
            Self::Submit { .. } => "submit",
            Self::Cancel { .. } => "cancel",
            Self::Modify { .. } => "modify",
            Self::GetOrderStatus { .. } => "getOrderStatus",
        }
    }

    /// Rejects commands the venue would bounce with a field-type error.
    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            Self::Submit { price, qty, .. } | Self::Modify { price, qty, .. } => {
                if !price.is_finite() || *price <= 0.0 {
                    return Err(AppError::InvalidArgument(
                        "order price must be finite and positive".to_string(),
                    ));
                }
                if *qty == 0 {
                    return Err(AppError::InvalidArgument(
                        "order quantity must be greater than zero".to_string(),
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

pub fn encode_request(request: &OutboundRequest) -> Result<String, AppError> {
    Ok(simd_json::serde::to_string(request)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::ClientId;

    fn decode(payload: &str) -> FeedMessage {
        decode_message(payload.to_string()).expect("message should decode")
    }

    #[test]
    fn decodes_pnl_response_and_push_identically() {
        let payload = r#"{"clients":[{"client_id":1,"name":"a","realized":10,"unrealized":5}]}"#;
        let response = decode(&format!(r#"{{"type":"all_pnl_response",{}"#, &payload[1..]));
        let push = decode(&format!(r#"{{"type":"all_pnl_push",{}"#, &payload[1..]));

        let (FeedMessage::AllPnl { clients: a, .. }, FeedMessage::AllPnl { clients: b, .. }) =
            (&response, &push)
        else {
            panic!("both kinds should decode as AllPnl");
        };
        assert_eq!(a, b);
        assert_eq!(a[0].client_id, ClientId::new("1"));
        assert_eq!(response.kind(), "all_pnl_response");
        assert_eq!(push.kind(), "all_pnl_push");
    }

    #[test]
    fn missing_collections_default_to_empty() {
        let message = decode(r#"{"type":"order_book_snapshot_response","bids":null}"#);

        assert_eq!(
            message,
            FeedMessage::OrderBookSnapshot {
                bids: Vec::new(),
                asks: Vec::new(),
            }
        );
    }

    #[test]
    fn malformed_list_entries_are_skipped_individually() {
        let message = decode(
            r#"{"type":"all_pnl_push","clients":[{"client_id":1,"realized":4},7,"x",{"client_id":2,"name":42}]}"#,
        );
        let FeedMessage::AllPnl { clients, pushed } = message else {
            panic!("push should decode as AllPnl");
        };

        assert!(pushed);
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].realized, 4.0);
        assert_eq!(clients[1].client_id, ClientId::new("2"));

        let history = decode(r#"{"type":"trade_history_response","trades":"none"}"#);
        assert_eq!(history, FeedMessage::TradeHistory { trades: Vec::new() });
    }

    #[test]
    fn unknown_and_untagged_documents_are_unrecognized() {
        assert_eq!(
            decode(r#"{"type":"heartbeat_v2","seq":4}"#),
            FeedMessage::Unrecognized {
                kind: "heartbeat_v2".to_string()
            }
        );
        assert_eq!(
            decode(r#"[1,2,3]"#),
            FeedMessage::Unrecognized {
                kind: String::new()
            }
        );
        assert_eq!(
            decode(r#"{"type":42}"#),
            FeedMessage::Unrecognized {
                kind: String::new()
            }
        );
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(decode_message(r#"{"type":"trade","price":"#.to_string()).is_err());
    }

    #[test]
    fn error_message_falls_back_to_generic_text() {
        assert_eq!(
            decode(r#"{"type":"error"}"#),
            FeedMessage::Error {
                message: "error".to_string()
            }
        );
    }

    #[test]
    fn order_status_without_success_flag_counts_as_success() {
        let FeedMessage::CommandAck(ack) =
            decode(r#"{"type":"order_status_response","id":12,"status":1}"#)
        else {
            panic!("order status should decode as ack");
        };

        assert_eq!(ack.kind, CommandKind::OrderStatus);
        assert!(ack.success);
        assert_eq!(ack.order_id, Some(12));
        assert_eq!(ack.status, Some(1));
    }

    #[test]
    fn encodes_requests_with_wire_tags() {
        let auth = encode_request(&OutboundRequest::Auth {
            token: "secret".to_string(),
        })
        .expect("auth should encode");
        let pull = encode_request(&OutboundRequest::GetAllPnl { corr: None })
            .expect("pull should encode");
        let pull_with_corr = encode_request(&OutboundRequest::GetTradeHistory { corr: Some(3) })
            .expect("pull should encode");

        assert_eq!(auth, r#"{"type":"auth","token":"secret"}"#);
        assert_eq!(pull, r#"{"type":"getAllPnL"}"#);
        assert_eq!(pull_with_corr, r#"{"type":"getTradeHistory","corr":3}"#);
    }

    #[test]
    fn validates_order_commands() {
        let zero_qty = OutboundRequest::Submit {
            price: 100.0,
            qty: 0,
            is_buy: true,
        };
        let bad_price = OutboundRequest::Modify {
            id: 1,
            price: f64::NAN,
            qty: 5,
        };

        assert!(zero_qty.validate().is_err());
        assert!(bad_price.validate().is_err());
        assert!(OutboundRequest::Cancel { id: 9 }.validate().is_ok());
    }
}
