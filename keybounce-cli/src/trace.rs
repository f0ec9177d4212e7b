use anyhow::{bail, Context, Result};
use keybounce_filter::{Decision, FilterConfig, KeyObservation, Keycode, Timestamp};

use crate::handler::{FilterHandler, KeyHandler};

/// Parse a key trace into observations.
///
/// One key-down per line: `<keycode> <time_ms>`, whitespace separated.
/// Time may be fractional. Blank lines and `#` comments are skipped.
pub fn parse_trace(input: &str) -> Result<Vec<KeyObservation>> {
    let mut observations = Vec::new();

    for (line_num, line) in input.lines().enumerate() {
        let line = match line.split_once('#') {
            Some((before, _)) => before,
            None => line,
        }
        .trim();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split_whitespace();
        let (Some(keycode), Some(time), None) = (fields.next(), fields.next(), fields.next())
        else {
            bail!("line {}: expected `<keycode> <time_ms>`", line_num + 1);
        };

        let keycode: Keycode = keycode
            .parse()
            .with_context(|| format!("line {}: invalid keycode {:?}", line_num + 1, keycode))?;
        let millis: f64 = time
            .parse()
            .with_context(|| format!("line {}: invalid time {:?}", line_num + 1, time))?;
        if !millis.is_finite() || millis < 0.0 {
            bail!("line {}: time must be a non-negative number of ms", line_num + 1);
        }

        let micros = (millis * 1000.0).round() as u64;
        observations.push(KeyObservation::new(keycode, Timestamp::from_micros(micros)));
    }

    Ok(observations)
}

/// Outcome of replaying a trace.
pub struct Replay {
    pub decisions: Vec<(KeyObservation, Decision)>,
    pub suppressed: u64,
}

/// Run observations through a fresh filter, in order.
pub fn replay(config: FilterConfig, observations: &[KeyObservation]) -> Replay {
    let mut handler = FilterHandler::new(config);
    let decisions = observations
        .iter()
        .map(|&o| (o, handler.on_key_down(o)))
        .collect();
    Replay {
        decisions,
        suppressed: handler.suppressed(),
    }
}

pub fn format_line(observation: &KeyObservation, decision: Decision) -> String {
    let label = match decision {
        Decision::Pass => "pass",
        Decision::Suppress => "suppress",
    };
    format!(
        "{:.3}\t{}\t{}",
        observation.timestamp.as_micros() as f64 / 1000.0,
        observation.keycode,
        label
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_trace() {
        let trace = "# bouncy b key\n\
                     11 0\n\
                     11 50.5   # bounce\n\
                     \n\
                     5\t300\n";
        let observations = parse_trace(trace).unwrap();
        assert_eq!(
            observations,
            vec![
                KeyObservation::new(11, Timestamp::from_micros(0)),
                KeyObservation::new(11, Timestamp::from_micros(50_500)),
                KeyObservation::new(5, Timestamp::from_millis(300)),
            ]
        );
    }

    #[test]
    fn test_parse_errors_name_line() {
        let cases = [
            "11 0\n11\n",
            "11 0\n11 5 7\n",
            "11 0\nx 5\n",
            "11 0\n11 -3\n",
            "11 0\n70000 5\n",
        ];
        for trace in cases {
            let err = parse_trace(trace).unwrap_err();
            assert!(format!("{:#}", err).contains("line 2"), "{:?}: {:#}", trace, err);
        }
    }

    #[test]
    fn test_replay_scenario() {
        let observations = parse_trace("11 0\n11 50\n11 260\n5 300\n11 310\n").unwrap();
        let result = replay(FilterConfig::new(11), &observations);

        let decisions: Vec<Decision> = result.decisions.iter().map(|(_, d)| *d).collect();
        assert_eq!(
            decisions,
            vec![
                Decision::Pass,
                Decision::Suppress,
                Decision::Pass,
                Decision::Pass,
                Decision::Pass,
            ]
        );
        assert_eq!(result.suppressed, 1);
    }

    #[test]
    fn test_replay_out_of_order_trace() {
        let observations = parse_trace("11 5000\n11 10\n").unwrap();
        let result = replay(FilterConfig::new(11), &observations);

        let decisions: Vec<Decision> = result.decisions.iter().map(|(_, d)| *d).collect();
        assert_eq!(decisions, vec![Decision::Pass, Decision::Suppress]);
        assert_eq!(result.suppressed, 1);
    }

    #[test]
    fn test_format_line() {
        let o = KeyObservation::new(11, Timestamp::from_micros(50_500));
        assert_eq!(format_line(&o, Decision::Suppress), "50.500\t11\tsuppress");
        assert_eq!(format_line(&o, Decision::Pass), "50.500\t11\tpass");
    }
}
