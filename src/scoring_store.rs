//! Text persistence for per-rule scoring tables.
//!
//! One record per line, tab-separated:
//!
//! ```text
//! repr(rule_str)  repr(feature_key)  repr(score)  repr(weight)  repr(count)
//! ```
//!
//! `rule_str` is a rule's [`crate::rules::Rule::identity`] and doubles as
//! the record's lookup key on load: an identity absent from the current
//! model is silently skipped (logged at debug) rather than erroring, so a
//! store can survive incremental edits to the rule set it was saved
//! against. The format is private to this crate; nothing outside this
//! module should depend on its exact shape.

use std::collections::{BTreeSet, HashMap};
use std::io::{BufRead, Write};

use crate::category::Category;
use crate::error::{Error, Result};
use crate::model::{Model, RuleHandle};
use crate::scoring::{FeatureKey, ScoreEntry};
use crate::symbol::Interner;

const FIELD_SEP: char = '\u{1}';

/// Write every rule's scoring table (default entry plus all learned
/// features) to `writer`, one record per line.
pub fn save<W: Write>(model: &Model, mut writer: W) -> Result<()> {
    let mut record_count = 0usize;
    for (_, rule) in model.iter_rules() {
        let rule_repr = escape(&rule.identity(&model.interner));
        let table = rule.scoring();
        for (key, entry) in table.iter_all() {
            let key_repr = encode_feature_key(key, &model.interner);
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{}",
                rule_repr, key_repr, entry.score, entry.weight, entry.count
            )
            .map_err(|e| Error::ScoringStore(format!("write failed: {e}")))?;
            record_count += 1;
        }
    }
    log::info!("saved scoring store: {record_count} records");
    Ok(())
}

/// Load a scoring store into `model`'s rules, overwriting any matching
/// stored entries. Records for rule identities absent from `model` are
/// skipped (not an error); malformed records (wrong field count, an
/// unparsable literal, a score outside `[0, 1]`) raise [`Error::ScoringStore`]
/// or [`Error::InvalidScore`].
pub fn load<R: BufRead>(model: &Model, reader: R) -> Result<()> {
    let mut identity_to_handle: HashMap<String, RuleHandle> = HashMap::new();
    for (handle, rule) in model.iter_rules() {
        identity_to_handle.insert(rule.identity(&model.interner), handle);
    }

    let mut loaded = 0usize;
    let mut skipped = 0usize;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| Error::ScoringStore(format!("read failed at line {}: {e}", lineno + 1)))?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 5 {
            return Err(Error::ScoringStore(format!(
                "line {}: expected 5 tab-separated fields, found {}",
                lineno + 1,
                fields.len()
            )));
        }

        let rule_str = unescape(fields[0]).map_err(|e| annotate(lineno, e))?;
        let Some(&handle) = identity_to_handle.get(&rule_str) else {
            log::debug!("scoring store: skipping record for unknown rule {rule_str:?}");
            skipped += 1;
            continue;
        };

        let key = decode_feature_key(fields[1], &model.interner).map_err(|e| annotate(lineno, e))?;
        let score: f64 = fields[2]
            .parse()
            .map_err(|_| Error::ScoringStore(format!("line {}: unparsable score literal {:?}", lineno + 1, fields[2])))?;
        let weight: f64 = fields[3]
            .parse()
            .map_err(|_| Error::ScoringStore(format!("line {}: unparsable weight literal {:?}", lineno + 1, fields[3])))?;
        let count: u64 = fields[4]
            .parse()
            .map_err(|_| Error::ScoringStore(format!("line {}: unparsable count literal {:?}", lineno + 1, fields[4])))?;

        model.rule(handle).set_score(key, ScoreEntry { score, weight, count })?;
        loaded += 1;
    }
    log::info!("loaded scoring store: {loaded} records applied, {skipped} skipped (unknown rule)");
    Ok(())
}

fn annotate(lineno: usize, err: Error) -> Error {
    match err {
        Error::ScoringStore(msg) => Error::ScoringStore(format!("line {}: {msg}", lineno + 1)),
        other => other,
    }
}

/// Quote and escape a string into the record format's literal form: a
/// double-quoted string with `\\`, `\"`, `\n`, `\t`, `\r` escaped. This is
/// deliberately simpler than Rust's `Debug` escaping (no `\u{..}` forms) --
/// it only has to round-trip through [`unescape`], not through a Rust
/// source file.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn unescape(s: &str) -> Result<String> {
    let inner = s
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| Error::ScoringStore(format!("expected a quoted literal, found {s:?}")))?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => return Err(Error::ScoringStore(format!("unrecognized escape sequence '\\{other}'"))),
            None => return Err(Error::ScoringStore("dangling escape at end of literal".into())),
        }
    }
    Ok(out)
}

/// Render a category in its `name(+p1,+p2,-n1)` string form, joined by
/// [`FIELD_SEP`] so it can share a line with other feature-key
/// fields before the whole record is escaped as one literal.
fn encode_feature_key(key: Option<&FeatureKey>, interner: &Interner) -> String {
    let raw = match key {
        None => "default".to_string(),
        Some(FeatureKey::HeadSpelling { category, token }) => {
            format!("head-spelling{FIELD_SEP}{}{FIELD_SEP}{}", interner.resolve(*category), token)
        }
        Some(FeatureKey::HeadProperty { category, property }) => {
            format!(
                "head-property{FIELD_SEP}{}{FIELD_SEP}{}",
                interner.resolve(*category),
                interner.resolve(*property)
            )
        }
        Some(FeatureKey::BodyCategory { head, component }) => {
            format!(
                "body-category{FIELD_SEP}{}{FIELD_SEP}{}",
                interner.resolve(*head),
                component.display(interner)
            )
        }
        Some(FeatureKey::BodyCategorySequence { head, first, second }) => {
            format!(
                "body-category-sequence{FIELD_SEP}{}{FIELD_SEP}{}{FIELD_SEP}{}",
                interner.resolve(*head),
                first.display(interner),
                second.display(interner)
            )
        }
    };
    escape(&raw)
}

fn decode_feature_key(field: &str, interner: &Interner) -> Result<Option<FeatureKey>> {
    let raw = unescape(field)?;
    let parts: Vec<&str> = raw.split(FIELD_SEP).collect();
    match parts.as_slice() {
        ["default"] => Ok(None),
        ["head-spelling", category, token] => Ok(Some(FeatureKey::HeadSpelling {
            category: interner.intern(category),
            token: (*token).to_string(),
        })),
        ["head-property", category, property] => Ok(Some(FeatureKey::HeadProperty {
            category: interner.intern(category),
            property: interner.intern(property),
        })),
        ["body-category", head, component] => Ok(Some(FeatureKey::BodyCategory {
            head: interner.intern(head),
            component: parse_category(component, interner)?,
        })),
        ["body-category-sequence", head, first, second] => Ok(Some(FeatureKey::BodyCategorySequence {
            head: interner.intern(head),
            first: parse_category(first, interner)?,
            second: parse_category(second, interner)?,
        })),
        _ => Err(Error::ScoringStore(format!("unrecognized feature-key record {raw:?}"))),
    }
}

/// Invert [`Category::display`]'s `name(+p1,+p2,-n1)` form.
fn parse_category(s: &str, interner: &Interner) -> Result<Category> {
    let open = s
        .find('(')
        .ok_or_else(|| Error::ScoringStore(format!("malformed category literal {s:?}")))?;
    if !s.ends_with(')') {
        return Err(Error::ScoringStore(format!("malformed category literal {s:?}")));
    }
    let name = &s[..open];
    let body = &s[open + 1..s.len() - 1];
    let mut positive = BTreeSet::new();
    let mut negative = BTreeSet::new();
    if !body.is_empty() {
        for part in body.split(',') {
            if let Some(p) = part.strip_prefix('+') {
                positive.insert(interner.intern(p));
            } else if let Some(n) = part.strip_prefix('-') {
                negative.insert(interner.intern(n));
            } else {
                return Err(Error::ScoringStore(format!("malformed category property {part:?}")));
            }
        }
    }
    Ok(Category::new(interner.intern(name), positive, negative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;
    use crate::rules::LeafRule;
    use crate::scoring::FeatureKey;
    use crate::symbol::Interner;
    use std::collections::BTreeSet;

    fn build_model() -> Model {
        let interner = Interner::new();
        let noun = Category::new(interner.intern("noun"), BTreeSet::new(), BTreeSet::new());
        let rule = LeafRule::new_set(noun, ["cat".to_string(), "dog".to_string()]);
        ModelConfig::new().with_primary_leaf_rule(rule).build(interner).unwrap()
    }

    #[test]
    fn round_trips_adjusted_scores() {
        let model = build_model();
        let rule = &model.primary_leaf_rules()[0];
        let key = FeatureKey::HeadSpelling {
            category: model.interner.intern("noun"),
            token: "cat".to_string(),
        };
        rule.adjust_score(&[key.clone()], 1.0).unwrap();
        rule.adjust_score(&[key.clone()], 1.0).unwrap();
        let before = rule.scoring().get(&key).unwrap();

        let mut buf = Vec::new();
        save(&model, &mut buf).unwrap();

        let reloaded = build_model();
        load(&reloaded, buf.as_slice()).unwrap();
        let reloaded_key = FeatureKey::HeadSpelling {
            category: reloaded.interner.intern("noun"),
            token: "cat".to_string(),
        };
        let after = reloaded.primary_leaf_rules()[0].scoring().get(&reloaded_key).unwrap();
        assert_eq!(before.score, after.score);
        assert_eq!(before.weight, after.weight);
        assert_eq!(before.count, after.count);
    }

    #[test]
    fn skips_records_for_rules_absent_from_the_model() {
        let model = build_model();
        let mut buf = Vec::new();
        save(&model, &mut buf).unwrap();

        let interner = Interner::new();
        let verb = Category::new(interner.intern("verb"), BTreeSet::new(), BTreeSet::new());
        let rule = LeafRule::new_set(verb, ["run".to_string()]);
        let other_model = ModelConfig::new().with_primary_leaf_rule(rule).build(interner).unwrap();

        // None of the saved records match a rule identity in `other_model`;
        // loading must not error, just skip every record.
        assert!(load(&other_model, buf.as_slice()).is_ok());
    }

    #[test]
    fn rejects_malformed_records() {
        let model = build_model();
        let bad = "not-enough-fields\twith-only-two-tabs\t0.5\n";
        assert!(load(&model, bad.as_bytes()).is_err());
    }
}
