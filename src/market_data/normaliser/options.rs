// Order option spellings (order type / time-in-force) per exchange.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::exchange::Exchange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingOption {
    Limit,
    Market,
    FillOrKill,
    ImmediateOrCancel,
    MakerOrCancel,
}

impl TradingOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingOption::Limit => "limit",
            TradingOption::Market => "market",
            TradingOption::FillOrKill => "fill-or-kill",
            TradingOption::ImmediateOrCancel => "immediate-or-cancel",
            TradingOption::MakerOrCancel => "maker-or-cancel",
        }
    }
}

impl fmt::Display for TradingOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradingOption {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            TradingOption::Limit,
            TradingOption::Market,
            TradingOption::FillOrKill,
            TradingOption::ImmediateOrCancel,
            TradingOption::MakerOrCancel,
        ]
        .into_iter()
        .find(|o| o.as_str() == s)
        .ok_or(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamValue {
    Str(&'static str),
    Int(i64),
}

/// How an exchange spells an option: a plain name, or a request parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionRepr {
    Name(&'static str),
    Param { key: &'static str, value: ParamValue },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OptionCell {
    Supported(OptionRepr),
    Unsupported,
}

pub(crate) fn option_cell(option: TradingOption, exchange: Exchange) -> Option<OptionCell> {
    use Exchange as E;
    use OptionCell::{Supported, Unsupported};
    use OptionRepr::{Name, Param};
    use TradingOption as O;

    let cell = match (option, exchange) {
        (O::Limit, E::Kraken | E::Poloniex | E::Coinbase) => Supported(Name("limit")),
        (O::Limit, E::Gemini) => Supported(Name("exchange limit")),

        (O::Market, E::Kraken | E::Coinbase) => Supported(Name("market")),
        (O::Market, E::Gemini | E::Poloniex) => Unsupported,

        (O::FillOrKill, E::Gemini) => Supported(Name("fill-or-kill")),
        (O::FillOrKill, E::Poloniex) => Supported(Name("fillOrKill")),
        (O::FillOrKill, E::Coinbase) => Supported(Param { key: "time_in_force", value: ParamValue::Str("FOK") }),
        (O::FillOrKill, E::Kraken) => Unsupported,

        (O::ImmediateOrCancel, E::Gemini) => Supported(Name("immediate-or-cancel")),
        (O::ImmediateOrCancel, E::Poloniex) => Supported(Name("immediateOrCancel")),
        (O::ImmediateOrCancel, E::Coinbase) => Supported(Param { key: "time_in_force", value: ParamValue::Str("IOC") }),
        (O::ImmediateOrCancel, E::Kraken) => Unsupported,

        (O::MakerOrCancel, E::Gemini) => Supported(Name("maker-or-cancel")),
        (O::MakerOrCancel, E::Poloniex) => Supported(Name("postOnly")),
        (O::MakerOrCancel, E::Coinbase) => Supported(Param { key: "post_only", value: ParamValue::Int(1) }),
        (O::MakerOrCancel, E::Kraken) => Supported(Name("post")),

        _ => return None,
    };
    Some(cell)
}
