use std::{
    fmt::{self, Display},
    str::FromStr,
};

use super::ActFn::{self, *};
use crate::{MlErr, Result};

impl Display for ActFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Linear(slope) => write!(f, "linear({slope})"),
            Sigmoid => f.write_str("sigmoid"),
            Tanh => f.write_str("tanh"),
            Relu => f.write_str("relu"),
            SignedLog => f.write_str("signed_log"),
            Scaled(inner, factor) => write!(f, "scaled({inner},{factor})"),
            Stretched(inner, factor) => write!(f, "stretched({inner},{factor})"),
        }
    }
}

fn parse_factor(s: &str) -> Option<f64> {
    s.trim().parse().ok()
}

impl FromStr for ActFn {
    type Err = MlErr;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let unknown = || MlErr::UnknownActivation(s.to_string());

        let Some((head, rest)) = s.split_once('(') else {
            return match s {
                "sigmoid" => Ok(Sigmoid),
                "tanh" => Ok(Tanh),
                "relu" => Ok(Relu),
                "signed_log" => Ok(SignedLog),
                _ => Err(unknown()),
            };
        };

        let args = rest.trim_end().strip_suffix(')').ok_or_else(unknown)?;

        match head.trim() {
            "linear" => parse_factor(args).map(Linear).ok_or_else(unknown),
            wrapper @ ("scaled" | "stretched") => {
                // The factor is always a plain number, so the last comma splits the arguments.
                let (inner, factor) = args.rsplit_once(',').ok_or_else(unknown)?;
                let inner = Box::new(inner.parse()?);
                let factor = parse_factor(factor).ok_or_else(unknown)?;

                if wrapper == "scaled" {
                    Ok(Scaled(inner, factor))
                } else {
                    Ok(Stretched(inner, factor))
                }
            }
            _ => Err(unknown()),
        }
    }
}

impl TryFrom<String> for ActFn {
    type Error = MlErr;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ActFn> for String {
    fn from(value: ActFn) -> Self {
        value.to_string()
    }
}
