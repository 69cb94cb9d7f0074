//! Line-oriented console over the order manager.
//!
//! Each command maps to exactly one facade call. Parsing and formatting live
//! here; order logic does not.

use std::str::FromStr;

use connector_core::FrameSink;
use execution_core::{DraftParseError, Order, OrderDraft};
use order_manager::{ModifyRequest, OrderError, OrderManager, SessionEvent, DEFAULT_HISTORY_COUNT};
use rust_decimal::Decimal;
use thiserror::Error;

pub const HELP: &str = "\
commands:
  place <id> <instrument> <spot|futures|options> <buy|sell> <kind> <amount> <price|0> [label]
  cancel <id>
  modify <id> <price|-> [amount]
  subscribe <channel>...          unsubscribe <channel>          unsubscribe_all
  history <currency> [count]      history_instrument <instrument> [count]
  summary <instrument>            summary_currency <currency> [kind]
  ticker <instrument>             contract_size <instrument>     currencies
  orders | order <id> | positions | subscriptions | status | metrics
  help | quit";

#[derive(Debug, Error, PartialEq)]
pub enum ConsoleError {
    #[error("unknown command: {0} (try 'help')")]
    UnknownCommand(String),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid {field}: '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error(transparent)]
    Draft(#[from] DraftParseError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Place(OrderDraft),
    Cancel(String),
    Modify {
        order_id: String,
        request: ModifyRequest,
    },
    Subscribe(Vec<String>),
    Unsubscribe(String),
    UnsubscribeAll,
    HistoryByCurrency {
        currency: String,
        count: u32,
    },
    HistoryByInstrument {
        instrument: String,
        count: u32,
    },
    SummaryByInstrument(String),
    SummaryByCurrency {
        currency: String,
        kind: Option<String>,
    },
    Ticker(String),
    ContractSize(String),
    Currencies,
    Orders,
    Order(String),
    Positions,
    Subscriptions,
    Status,
    Metrics,
    Help,
    Quit,
}

fn required<'a>(args: &mut impl Iterator<Item = &'a str>, name: &'static str) -> Result<String, ConsoleError> {
    args.next()
        .map(str::to_string)
        .ok_or(ConsoleError::MissingArgument(name))
}

fn count(arg: Option<&str>) -> Result<u32, ConsoleError> {
    match arg {
        None => Ok(DEFAULT_HISTORY_COUNT),
        Some(value) => value.parse().map_err(|_| ConsoleError::InvalidNumber {
            field: "count",
            value: value.to_string(),
        }),
    }
}

fn decimal(field: &'static str, value: &str) -> Result<Decimal, ConsoleError> {
    Decimal::from_str(value).map_err(|_| ConsoleError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

impl FromStr for ConsoleCommand {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let mut args = rest.split_whitespace();

        let command = match verb {
            "place" => Self::Place(rest.parse()?),
            "cancel" => Self::Cancel(required(&mut args, "order id")?),
            "modify" => {
                let order_id = required(&mut args, "order id")?;
                let price = required(&mut args, "price")?;
                let new_price = match price.as_str() {
                    "-" => None,
                    p => Some(decimal("price", p)?),
                };
                let new_amount = args.next().map(|a| decimal("amount", a)).transpose()?;
                Self::Modify {
                    order_id,
                    request: ModifyRequest {
                        new_price,
                        new_amount,
                        ..Default::default()
                    },
                }
            }
            "subscribe" => {
                let channels: Vec<String> = args.map(str::to_string).collect();
                if channels.is_empty() {
                    return Err(ConsoleError::MissingArgument("channel"));
                }
                Self::Subscribe(channels)
            }
            "unsubscribe" => Self::Unsubscribe(required(&mut args, "channel")?),
            "unsubscribe_all" => Self::UnsubscribeAll,
            "history" => Self::HistoryByCurrency {
                currency: required(&mut args, "currency")?,
                count: count(args.next())?,
            },
            "history_instrument" => Self::HistoryByInstrument {
                instrument: required(&mut args, "instrument")?,
                count: count(args.next())?,
            },
            "summary" => Self::SummaryByInstrument(required(&mut args, "instrument")?),
            "summary_currency" => Self::SummaryByCurrency {
                currency: required(&mut args, "currency")?,
                kind: args.next().map(str::to_string),
            },
            "ticker" => Self::Ticker(required(&mut args, "instrument")?),
            "contract_size" => Self::ContractSize(required(&mut args, "instrument")?),
            "currencies" => Self::Currencies,
            "orders" => Self::Orders,
            "order" => Self::Order(required(&mut args, "order id")?),
            "positions" => Self::Positions,
            "subscriptions" => Self::Subscriptions,
            "status" => Self::Status,
            "metrics" => Self::Metrics,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(ConsoleError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }
}

/// Run one command, returning the text to print.
pub fn execute<S: FrameSink>(
    manager: &OrderManager<S>,
    command: ConsoleCommand,
) -> Result<String, OrderError> {
    let sent = |id: u64| format!("sent request {id}");
    let output = match command {
        ConsoleCommand::Place(draft) => sent(manager.place(draft)?),
        ConsoleCommand::Cancel(order_id) => sent(manager.cancel(&order_id)?),
        ConsoleCommand::Modify { order_id, request } => sent(manager.modify(&order_id, request)?),
        ConsoleCommand::Subscribe(channels) => sent(manager.stream_market_data(&channels)?),
        ConsoleCommand::Unsubscribe(channel) => sent(manager.unsubscribe(&channel)?),
        ConsoleCommand::UnsubscribeAll => sent(manager.unsubscribe_all()?),
        ConsoleCommand::HistoryByCurrency { currency, count } => {
            sent(manager.order_history_by_currency(&currency, count)?)
        }
        ConsoleCommand::HistoryByInstrument { instrument, count } => {
            sent(manager.order_history_by_instrument(&instrument, count)?)
        }
        ConsoleCommand::SummaryByInstrument(instrument) => {
            sent(manager.book_summary_by_instrument(&instrument)?)
        }
        ConsoleCommand::SummaryByCurrency { currency, kind } => {
            sent(manager.book_summary_by_currency(&currency, kind.as_deref())?)
        }
        ConsoleCommand::Ticker(instrument) => sent(manager.ticker(&instrument)?),
        ConsoleCommand::ContractSize(instrument) => sent(manager.contract_size(&instrument)?),
        ConsoleCommand::Currencies => sent(manager.currencies()?),
        ConsoleCommand::Orders => {
            let orders = manager.list_orders();
            if orders.is_empty() {
                "no orders".to_string()
            } else {
                orders.iter().map(format_order).collect::<Vec<_>>().join("\n")
            }
        }
        ConsoleCommand::Order(order_id) => match manager.get_order(&order_id) {
            Some(order) => format_order(&order),
            None => format!("unknown order {order_id}"),
        },
        ConsoleCommand::Positions => {
            let positions = manager.positions();
            if positions.is_empty() {
                "no positions".to_string()
            } else {
                positions
                    .iter()
                    .map(|p| {
                        format!(
                            "{} | net {} | entry {} | realized {} | fees {}",
                            p.instrument, p.net_amount, p.avg_entry_price, p.realized_pnl, p.total_fees
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        ConsoleCommand::Subscriptions => manager.subscriptions().join("\n"),
        ConsoleCommand::Status => format!(
            "{} | {} requests in flight",
            manager.connection_status().get(),
            manager.in_flight()
        ),
        ConsoleCommand::Metrics => manager.metrics().snapshot().to_string(),
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Quit => String::new(),
    };
    Ok(output)
}

pub fn format_order(order: &Order) -> String {
    let average = order
        .average_price
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "{} | {} | {} {} | {} | filled {}/{} | avg {} | venue {}",
        order.order_id,
        order.instrument,
        order.side,
        order.kind,
        order.status,
        order.filled_amount,
        order.amount,
        average,
        order.venue_order_id.as_deref().unwrap_or("-"),
    );
    if let Some(reason) = &order.reject_reason {
        line.push_str(&format!(" | reason {reason}"));
    }
    line
}

pub fn format_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::OrderUpdated(order) => format!("order  {}", format_order(order)),
        SessionEvent::QueryResult { kind, payload } => format!("result {kind} {payload}"),
        SessionEvent::MarketData { channel, payload } => format!("data   {channel} {payload}"),
        SessionEvent::SubscriptionsChanged(channels) => {
            format!("subs   [{}]", channels.join(", "))
        }
        SessionEvent::Authenticated {
            scope,
            expires_in_secs,
        } => format!("auth   scope {scope}, expires in {expires_in_secs}s"),
        SessionEvent::Diagnostic(diagnostic) => format!("warn   {diagnostic}"),
    }
}
