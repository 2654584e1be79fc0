use crate::config::AppConfig;
use crate::mode::Mode;

/// The single decision point converting mode + config into a boolean
/// permission for a mutating trading call. This predicate is consulted
/// exactly once per mutating call, by the Trading Service — no other
/// component re-derives this decision.
///
/// `op_is_mutating` distinguishes read operations (always allowed, subject
/// to session/adapter state) from operations that place, cancel, or modify
/// an order.
pub fn trading_allowed(op_is_mutating: bool, mode: Mode, config: &AppConfig) -> bool {
    if !op_is_mutating {
        return true;
    }
    mode == Mode::Prod && config.upstream.trading.allow_real_trading
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(allow_real_trading: bool) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.upstream.trading.allow_real_trading = allow_real_trading;
        cfg
    }

    #[test]
    fn reads_are_always_allowed() {
        for mode in [Mode::Mock, Mode::Dev, Mode::Prod] {
            assert!(trading_allowed(false, mode, &config_with(false)));
        }
    }

    #[test]
    fn mutating_calls_require_prod_and_flag() {
        assert!(!trading_allowed(true, Mode::Mock, &config_with(true)));
        assert!(!trading_allowed(true, Mode::Dev, &config_with(true)));
        assert!(!trading_allowed(true, Mode::Prod, &config_with(false)));
        assert!(trading_allowed(true, Mode::Prod, &config_with(true)));
    }
}
