use super::{Clause, ClauseMarkers, Fanout, Result, ScriptError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Parse a script with the default delimited grammar.
///
/// Malformed clauses are skipped (and logged); they never abort the parse.
pub fn parse_script(script: &str) -> ParsedScript {
    DelimitedGrammar.parse(script)
}

/// Grammar seam, so a stricter (e.g. quoted-argument) grammar can be swapped in
/// without touching the runner.
pub trait ScriptGrammar: Send + Sync {
    /// Split a script into clauses.
    fn parse(&self, script: &str) -> ParsedScript;
}

/// Clause rejected during parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedClause {
    /// Raw clause text as authored.
    pub text: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Result of parsing a script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedScript {
    /// Accepted clauses in source order.
    pub clauses: Vec<Clause>,
    /// Clauses skipped as malformed.
    pub skipped: Vec<SkippedClause>,
}

impl ParsedScript {
    /// Clauses marked `*`, in first-seen order.
    pub fn startup(&self) -> impl Iterator<Item = &Clause> {
        self.clauses.iter().filter(|c| c.markers.startup)
    }

    /// Clauses marked `#`, in first-seen order.
    pub fn completion(&self) -> impl Iterator<Item = &Clause> {
        self.clauses.iter().filter(|c| c.markers.completion)
    }

    /// Clauses executed on every loop pass.
    pub fn main_loop(&self) -> impl Iterator<Item = &Clause> {
        self.clauses.iter().filter(|c| c.markers.in_main_loop())
    }

    /// Whether the script produced no clauses at all.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// The authored grammar: `VERB:arg1,arg2;` with naive splitting and no escapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelimitedGrammar;

impl ScriptGrammar for DelimitedGrammar {
    fn parse(&self, script: &str) -> ParsedScript {
        let flattened: String = script.chars().filter(|c| *c != '\n' && *c != '\r').collect();
        let mut parsed = ParsedScript::default();

        for raw in flattened.split(';') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            match parse_clause(raw) {
                Ok(clause) => parsed.clauses.push(clause),
                Err(err) => {
                    warn!(clause = raw, error = %err, "skipping malformed script clause");
                    parsed.skipped.push(SkippedClause {
                        text: raw.to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        parsed
    }
}

/// Decode a single non-empty clause.
pub fn parse_clause(raw: &str) -> Result<Clause> {
    let markers = ClauseMarkers {
        startup: raw.contains('*'),
        completion: raw.contains('#'),
    };
    let text: String = raw
        .chars()
        .filter(|c| *c != '*' && *c != '#')
        .collect::<String>()
        .trim()
        .to_string();

    let (verb_segment, raw_args) = match text.split_once(':') {
        Some((verb, args)) => (verb.to_string(), args.trim().to_string()),
        None => (text.clone(), String::new()),
    };

    let (verb_segment, loop_limit) = take_loop_limit(&verb_segment, raw)?;
    let (verb_segment, peer_override) = take_peer_override(&verb_segment, raw)?;
    let fanout = Fanout::from_verb_segment(&verb_segment);

    let verb: String = verb_segment
        .chars()
        .filter(|c| *c != '$' && *c != '%')
        .collect::<String>()
        .trim()
        .to_ascii_uppercase();
    if verb.is_empty() {
        return Err(ScriptError::MissingVerb(raw.to_string()));
    }

    Ok(Clause {
        text,
        markers,
        verb,
        raw_args,
        loop_limit,
        peer_override,
        fanout,
    })
}

fn take_loop_limit(segment: &str, raw: &str) -> Result<(String, Option<u32>)> {
    let Some(open) = segment.find('{') else {
        return Ok((segment.to_string(), None));
    };
    let close = segment[open..]
        .find('}')
        .map(|offset| open + offset)
        .ok_or_else(|| ScriptError::UnterminatedModifier {
            clause: raw.to_string(),
            open: '{',
        })?;

    let body = segment[open + 1..close].trim();
    let limit = body
        .parse::<u32>()
        .map_err(|_| ScriptError::InvalidLoopLimit {
            clause: raw.to_string(),
            value: body.to_string(),
        })?;

    let mut cleaned = String::with_capacity(segment.len());
    cleaned.push_str(&segment[..open]);
    cleaned.push_str(&segment[close + 1..]);
    Ok((cleaned, Some(limit)))
}

fn take_peer_override(segment: &str, raw: &str) -> Result<(String, Option<Vec<String>>)> {
    let Some(open) = segment.find('[') else {
        return Ok((segment.to_string(), None));
    };
    let close = segment[open..]
        .find(']')
        .map(|offset| open + offset)
        .ok_or_else(|| ScriptError::UnterminatedModifier {
            clause: raw.to_string(),
            open: '[',
        })?;

    let names: Vec<String> = segment[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    let mut cleaned = String::with_capacity(segment.len());
    cleaned.push_str(&segment[..open]);
    cleaned.push_str(&segment[close + 1..]);
    Ok((cleaned, Some(names)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn splits_clauses_and_drops_empty_ones() {
        let parsed = parse_script("HEAD:10,0,0,500;;\n PAUSE:200 ;\r\n");
        assert_eq!(parsed.clauses.len(), 2);
        assert_eq!(parsed.clauses[0].verb, "HEAD");
        assert_eq!(parsed.clauses[0].raw_args, "10,0,0,500");
        assert_eq!(parsed.clauses[1].verb, "PAUSE");
        assert_eq!(parsed.clauses[1].raw_args, "200");
        assert!(parsed.skipped.is_empty());
    }

    #[test]
    fn splits_on_first_colon_only() {
        let clause = parse_clause("WEB:http://10.0.0.5:8080/face").unwrap();
        assert_eq!(clause.verb, "WEB");
        assert_eq!(clause.raw_args, "http://10.0.0.5:8080/face");
    }

    #[test]
    fn decodes_one_shot_markers() {
        let parsed = parse_script("*LIGHT:true;HEAD:10,0,0,500;#LIGHT:false;");
        let startup: Vec<_> = parsed.startup().map(|c| c.text.as_str()).collect();
        let completion: Vec<_> = parsed.completion().map(|c| c.text.as_str()).collect();
        let main: Vec<_> = parsed.main_loop().map(|c| c.verb.as_str()).collect();
        assert_eq!(startup, ["LIGHT:true"]);
        assert_eq!(completion, ["LIGHT:false"]);
        assert_eq!(main, ["HEAD"]);
    }

    #[test]
    fn both_markers_can_apply() {
        let clause = parse_clause("#*LED:0,0,0").unwrap();
        assert!(clause.markers.startup);
        assert!(clause.markers.completion);
        assert!(!clause.markers.in_main_loop());
        assert_eq!(clause.text, "LED:0,0,0");
    }

    #[test]
    fn decodes_loop_limit_override_and_fanout() {
        let clause = parse_clause("arms$$[misty-1, misty-2]{3}:45,45,1000").unwrap();
        assert_eq!(clause.verb, "ARMS");
        assert_eq!(clause.loop_limit, Some(3));
        assert_eq!(
            clause.peer_override,
            Some(vec!["misty-1".to_string(), "misty-2".to_string()])
        );
        assert_eq!(clause.fanout, Fanout::ToOthersAndAwaitAck);
        assert_eq!(clause.relay_command(), "ARMS:45,45,1000");
    }

    #[test]
    fn fanout_sigils_are_stripped() {
        let clause = parse_clause("CMD$$%:a,b").unwrap();
        assert_eq!(clause.verb, "CMD");
        assert_eq!(clause.fanout, Fanout::ToAllAndAwaitAck);

        let clause = parse_clause("CMD$:a,b").unwrap();
        assert_eq!(clause.fanout, Fanout::ToOthersOnly);
        assert!(!clause.fanout.include_self());
    }

    #[test]
    fn verbless_and_malformed_clauses_are_skipped() {
        let parsed = parse_script(":10;HEAD{x}:1,2,3,4;ARMS{2:1,2,3;STOP");
        assert_eq!(parsed.clauses.len(), 1);
        assert_eq!(parsed.clauses[0].verb, "STOP");
        assert_eq!(parsed.skipped.len(), 3);
    }

    proptest! {
        #[test]
        fn never_yields_more_clauses_than_segments(script in ".{0,200}") {
            let parsed = parse_script(&script);
            let segments = script.split(';').count();
            prop_assert!(parsed.clauses.len() + parsed.skipped.len() <= segments);
            for clause in &parsed.clauses {
                prop_assert!(!clause.verb.is_empty());
                prop_assert!(!clause.verb.contains('$'));
            }
        }
    }
}
