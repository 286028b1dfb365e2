use std::env::args;
use std::panic;
use std::process;
use std::str::FromStr;
use std::string::ToString;

use strum::IntoEnumIterator;
use strum_macros::{self, Display, EnumIter, EnumString};
use tracing_subscriber::EnvFilter;

use synchprobs::{config::HarnessConfig, harness};

fn main() -> Result<(), String> {
    // a misused lock panics on whatever thread noticed it, nobody may carry on after that
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        default_hook(info);
        process::abort();
    }));

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_names(true)
        .init();

    let config = HarnessConfig::from_env().map_err(|e| e.to_string())?;

    args()
        .nth(1)
        .ok_or(format!(
            "no test supplied, use one of {}",
            Test::iter()
                .map(|t| t.to_string())
                .collect::<Vec<String>>()
                .join(",")
        ))
        .and_then(|selector| Test::from_str(&selector).map_err(|e| format!("{selector}: {e}")))
        .and_then(|test| {
            let result = match test {
                Test::Rwt1 => harness::rwt1(&config),
                Test::Rwt2 => harness::rwt2(),
                Test::Rwt3 => harness::rwt3(),
                Test::Rwt4 => harness::rwt4(),
                Test::Rwt5 => harness::rwt5(),
                Test::Sp1 => harness::sp1(&config),
            };
            result.map_err(|e| e.to_string())
        })
}

#[derive(EnumIter, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
enum Test {
    Rwt1,
    Rwt2,
    Rwt3,
    Rwt4,
    Rwt5,
    Sp1,
}
