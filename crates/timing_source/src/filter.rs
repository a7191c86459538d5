use crate::error::SourceError;

/// The two actions an `event -> action` rule line can name (§4.3).
///
/// `Publish` registers a software condition so the matched event is handed
/// back to us through [`crate::backend::TimingBackend::poll_events`].
/// `Io` registers a hardware output condition: the card itself drives
/// `port` through the given `(delay_ns, level)` steps with no software in
/// the loop, grounded on `TimingSource.hpp`'s `IOn(delay,state,...)`
/// action syntax.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Publish,
    Io { port: String, steps: Vec<(u64, bool)> },
}

/// A parsed `filter -> action_list` line: the compiled `(id, mask)` pair
/// used to match incoming event ids, plus what to do when one matches.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    pub id: u64,
    pub mask: u64,
    pub actions: Vec<Action>,
}

impl CompiledRule {
    pub fn matches(&self, id: u64) -> bool {
        (id & self.mask) == (self.id & self.mask)
    }
}

const FIXED_ID: u64 = 0x1000_0000_0000_0000;
const FIXED_MASK: u64 = 0xf000_0000_0000_0000;

/// Parses one `<filter> -> <action>[,<action>...]` configuration line.
pub fn parse_event_action(line: &str) -> Result<CompiledRule, SourceError> {
    let (filter_str, actions_str) = line.split_once("->").ok_or_else(|| {
        SourceError::Configuration(format!("event action '{line}' is missing a '->' separator"))
    })?;
    let (id, mask) = parse_filter(filter_str.trim())?;
    let actions = parse_actions(actions_str.trim())?;
    if actions.is_empty() {
        return Err(SourceError::Configuration(format!(
            "event action '{line}' names no actions"
        )));
    }
    Ok(CompiledRule { id, mask, actions })
}

/// Compiles the six colon-separated filter fields
/// (`group:event:BEAM-IN=:BPC-START=:seq_id:bp_id`) into an `(id, mask)`
/// pair. Every field is optional; a field present in the filter narrows
/// the mask, a field left blank (or omitted as a trailing field) leaves
/// its bits wildcarded. Grounded on `TimingSource::parseFilter`.
fn parse_filter(filter: &str) -> Result<(u64, u64), SourceError> {
    let tokens: Vec<&str> = filter.split(':').collect();
    if tokens.len() > 6 {
        return Err(SourceError::Configuration(format!(
            "filter '{filter}' has more than six fields"
        )));
    }

    let mut id = FIXED_ID;
    let mut mask = FIXED_MASK;

    if let Some(&tok) = tokens.first() {
        if !tok.is_empty() {
            let group: u64 = tok
                .parse()
                .map_err(|_| SourceError::Configuration(format!("illegal timing group '{tok}'")))?;
            id |= group << 48;
            mask |= 0xfff << 48;
        }
    }
    if let Some(&tok) = tokens.get(1) {
        if !tok.is_empty() {
            let event: u64 = tok.parse().map_err(|_| {
                SourceError::Configuration(format!("illegal event number '{tok}'"))
            })?;
            id |= event << 36;
            mask |= 0xfff << 36;
        }
    }
    if let Some(&tok) = tokens.get(2) {
        if !tok.is_empty() {
            match tok {
                "BEAM-IN=1" => {
                    id |= 1 << 35;
                    mask |= 1 << 35;
                }
                "BEAM-IN=0" => mask |= 1 << 35,
                other => {
                    return Err(SourceError::Configuration(format!(
                        "BEAM-IN field must be 'BEAM-IN=0' or 'BEAM-IN=1', was '{other}'"
                    )))
                }
            }
        }
    }
    if let Some(&tok) = tokens.get(3) {
        if !tok.is_empty() {
            match tok {
                "BPC-START=1" => {
                    id |= 1 << 34;
                    mask |= 1 << 34;
                }
                "BPC-START=0" => mask |= 1 << 34,
                other => {
                    return Err(SourceError::Configuration(format!(
                        "BPC-START field must be 'BPC-START=0' or 'BPC-START=1', was '{other}'"
                    )))
                }
            }
        }
    }
    if let Some(&tok) = tokens.get(4) {
        if !tok.is_empty() {
            let seq: u64 = tok
                .parse()
                .map_err(|_| SourceError::Configuration(format!("illegal sequence id '{tok}'")))?;
            mask |= 0x3 << 32;
            id |= seq << 20;
            mask |= 0xfff << 20;
        }
    }
    if let Some(&tok) = tokens.get(5) {
        if !tok.is_empty() {
            let bp: u64 = tok.parse().map_err(|_| {
                SourceError::Configuration(format!("illegal beam process id '{tok}'"))
            })?;
            id |= bp << 6;
            mask |= 0x3fff << 6;
        }
    }

    Ok((id, mask))
}

/// Parses a comma-separated list of `NAME(...)` actions, e.g.
/// `PUBLISH(),IO1(400,on,8000,off)`. `PUBLISH` takes no arguments; any
/// other name is an output port and its parenthesized body is a flat
/// `delay_us,on|off` list applied in order. Grounded on
/// `TimingSource::parseTriggerAction`.
fn parse_actions(actions: &str) -> Result<Vec<Action>, SourceError> {
    let mut result = Vec::new();
    let bytes = actions.as_bytes();
    let mut pos = 0usize;

    while pos < actions.len() {
        let open = actions[pos..]
            .find('(')
            .map(|i| i + pos)
            .ok_or_else(|| SourceError::Configuration(format!("action '{actions}' missing '('")))?;
        let close = actions[open..]
            .find(')')
            .map(|i| i + open)
            .ok_or_else(|| SourceError::Configuration(format!("action '{actions}' missing ')'")))?;
        let name = actions[pos..open].trim().to_string();
        let inner = actions[open + 1..close].trim();

        if name == "PUBLISH" {
            if !inner.is_empty() {
                return Err(SourceError::Configuration(
                    "PUBLISH() takes no arguments".to_string(),
                ));
            }
            result.push(Action::Publish);
        } else {
            if name.is_empty() {
                return Err(SourceError::Configuration(format!(
                    "action '{actions}' has an empty name"
                )));
            }
            let parts: Vec<&str> = if inner.is_empty() {
                Vec::new()
            } else {
                inner.split(',').collect()
            };
            if parts.len() % 2 != 0 {
                return Err(SourceError::Configuration(format!(
                    "action '{name}' has an odd number of delay/state arguments"
                )));
            }
            let mut steps = Vec::with_capacity(parts.len() / 2);
            for pair in parts.chunks(2) {
                let delay_us: u64 = pair[0].trim().parse().map_err(|_| {
                    SourceError::Configuration(format!(
                        "invalid delay '{}' in action '{name}'",
                        pair[0]
                    ))
                })?;
                let level = match pair[1].trim() {
                    "on" => true,
                    "off" => false,
                    other => {
                        return Err(SourceError::Configuration(format!(
                            "state must be 'on' or 'off' in action '{name}', was '{other}'"
                        )))
                    }
                };
                steps.push((delay_us, level));
            }
            result.push(Action::Io { port: name, steps });
        }

        if close + 1 >= bytes.len() {
            break;
        }
        if bytes[close + 1] != b',' {
            return Err(SourceError::Configuration(format!(
                "actions in '{actions}' must be comma-separated"
            )));
        }
        pos = close + 2;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_filter_narrows_every_field() {
        let (id, mask) = parse_filter("3:7:BEAM-IN=1:BPC-START=0:12:5").unwrap();
        assert_eq!(id & FIXED_MASK, FIXED_ID);
        assert_eq!((id >> 48) & 0xfff, 3);
        assert_eq!((id >> 36) & 0xfff, 7);
        assert_eq!((id >> 35) & 1, 1);
        assert_eq!((id >> 34) & 1, 0);
        assert_eq!((id >> 20) & 0xfff, 12);
        assert_eq!((id >> 6) & 0x3fff, 5);
        assert_eq!(mask, FIXED_MASK | (0xfff << 48) | (0xfff << 36) | (1 << 35) | (1 << 34) | (0x3 << 32) | (0xfff << 20) | (0x3fff << 6));
    }

    #[test]
    fn partial_filter_leaves_trailing_fields_wildcarded() {
        let (id, mask) = parse_filter("3:7").unwrap();
        assert_eq!(mask, FIXED_MASK | (0xfff << 48) | (0xfff << 36));
        assert_eq!((id >> 48) & 0xfff, 3);
    }

    #[test]
    fn empty_leading_field_is_wildcarded() {
        let (_, mask) = parse_filter(":7").unwrap();
        assert_eq!(mask, FIXED_MASK | (0xfff << 36));
    }

    #[test]
    fn rejects_bad_beam_in_token() {
        assert!(parse_filter("3:7:1").is_err());
    }

    #[test]
    fn compiled_rule_matches_masked_ids() {
        let (id, mask) = parse_filter("3:7").unwrap();
        let rule = CompiledRule {
            id,
            mask,
            actions: vec![Action::Publish],
        };
        let candidate = id | (0xabc << 20);
        assert!(rule.matches(candidate));
        assert!(!rule.matches(id ^ (1 << 48)));
    }

    #[test]
    fn parses_publish_action() {
        let rule = parse_event_action("3:7 -> PUBLISH()").unwrap();
        assert_eq!(rule.actions, vec![Action::Publish]);
    }

    #[test]
    fn parses_io_action_with_multiple_steps() {
        let rule = parse_event_action("3:7 -> IO1(400,on,8000,off)").unwrap();
        assert_eq!(
            rule.actions,
            vec![Action::Io {
                port: "IO1".to_string(),
                steps: vec![(400, true), (8000, false)],
            }]
        );
    }

    #[test]
    fn parses_multiple_comma_separated_actions() {
        let rule = parse_event_action("3:7 -> PUBLISH(),IO2(0,on)").unwrap();
        assert_eq!(rule.actions.len(), 2);
        assert_eq!(rule.actions[0], Action::Publish);
    }

    #[test]
    fn rejects_missing_arrow() {
        assert!(parse_event_action("3:7 PUBLISH()").is_err());
    }

    #[test]
    fn rejects_odd_argument_count() {
        assert!(parse_event_action("3:7 -> IO1(400,on,8000)").is_err());
    }
}
