/// Log filter selection for the binary

/// Filter directive for a run: `-v` is debug and `-vv` trace regardless of
/// the environment; otherwise `RUST_LOG`, then `FLORAKB_LOG`, then info.
pub fn filter_directive(verbose: u8, rust_log: Option<&str>, florakb_log: Option<&str>) -> String {
    match verbose {
        0 => non_empty(rust_log)
            .or_else(|| non_empty(florakb_log))
            .unwrap_or("info")
            .to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, None, None, "info")]
    #[case(0, None, Some("warn"), "warn")]
    #[case(0, Some("florakb=trace"), Some("warn"), "florakb=trace")]
    #[case(0, Some(""), Some("error"), "error")]
    #[case(1, None, Some("warn"), "debug")]
    #[case(1, Some("error"), Some("warn"), "debug")]
    #[case(2, None, None, "trace")]
    fn test_filter_directive(
        #[case] verbose: u8,
        #[case] rust_log: Option<&str>,
        #[case] florakb_log: Option<&str>,
        #[case] expected: &str,
    ) {
        assert_eq!(filter_directive(verbose, rust_log, florakb_log), expected);
    }
}
