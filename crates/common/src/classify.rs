//! Classification of raw attempt outcomes into per-code policy.
//!
//! Connect-stage failures only establish reachability, so they are never
//! recorded; the job is retried transparently against another endpoint.
//! Exchange-stage outcomes are the measurement itself and are always
//! conclusive, because even "nothing came back" after a successful handshake
//! is evidence of interference.

use std::time::Duration;

use crate::types::{Attempt, Classification, Code, Reinsert, Stage};

/// Cooldown applied to an endpoint that timed out or was unreachable at
/// connect time before it re-enters circulation.
pub const CONNECT_RETRY_COOLDOWN: Duration = Duration::from_secs(30);

const fn verdict(stage: Stage, code: Code, conclusive: bool, reinsert: Reinsert) -> Classification {
    Classification {
        stage,
        code,
        conclusive,
        reinsert,
        fatal: false,
    }
}

/// Map one attempt outcome to its semantic code, conclusiveness, and
/// endpoint reinsertion policy.
///
/// `residual` is the residual-censorship cooldown applied to an endpoint
/// that reset the connection mid-exchange.
#[must_use]
pub fn classify(attempt: &Attempt, residual: Duration) -> Classification {
    match attempt {
        Attempt::ConnectTimeout => verdict(
            Stage::Tcp,
            Code::Timeout,
            false,
            Reinsert::After(CONNECT_RETRY_COOLDOWN),
        ),
        Attempt::ConnectRefused => verdict(Stage::Tcp, Code::Refused, false, Reinsert::Retire),
        Attempt::Unreachable => verdict(
            Stage::Tcp,
            Code::Unreachable,
            false,
            Reinsert::After(CONNECT_RETRY_COOLDOWN),
        ),
        Attempt::ConnectFailed(_) => verdict(Stage::Tcp, Code::Unexpected, false, Reinsert::Now),
        Attempt::ExchangeTimeout => verdict(Stage::Http, Code::Timeout, true, Reinsert::Now),
        Attempt::Reset => verdict(Stage::Http, Code::Rst, true, Reinsert::After(residual)),
        Attempt::StreamEof => verdict(Stage::Http, Code::Eof, true, Reinsert::Now),
        Attempt::ResponseComplete => verdict(Stage::Http, Code::Success, true, Reinsert::Now),
        Attempt::ExchangeFailed(_) => verdict(Stage::Http, Code::Unexpected, false, Reinsert::Now),
        Attempt::OutOfFiles { stage, .. } => Classification {
            stage: *stage,
            code: Code::TooManyFiles,
            conclusive: false,
            reinsert: Reinsert::Now,
            fatal: true,
        },
    }
}
