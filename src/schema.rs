//! JSON Schema draft-v4 validator: a recursive descent over schema keywords,
//! dispatched by which keys are present in the schema object (the same
//! dispatch-by-shape style the parser itself uses).

use crate::error::Error;
use crate::value::Value;

/// Schema-combinator recursion is capped at the same depth as include nesting,
/// so a pathological `$ref`/`allOf` cycle fails the same way runaway includes do.
pub const MAX_SCHEMA_DEPTH: usize = crate::chunk::MAX_CHUNK_DEPTH;

pub fn validate(schema: &Value, value: &Value) -> Result<(), Error> {
    log::debug!("schema validation starting at #");
    let result = validate_at(schema, value, schema, "#", 0);
    match &result {
        Ok(()) => log::debug!("schema validation passed"),
        Err(e) => log::debug!("schema validation failed: {e}"),
    }
    result
}

fn validate_at(schema: &Value, value: &Value, root: &Value, path: &str, depth: usize) -> Result<(), Error> {
    if depth > MAX_SCHEMA_DEPTH {
        return Err(Error::RecursionTooDeep {
            limit: MAX_SCHEMA_DEPTH,
        });
    }
    let schema_obj = schema.with_object(|o| o.clone()).ok_or_else(|| Error::InvalidSchema {
        path: path.to_string(),
        reason: "schema must be an object".to_string(),
    })?;

    if let Some(ref_target) = schema_obj.get("$ref").and_then(|v| v.as_str()) {
        let resolved = resolve_ref(root, &ref_target).ok_or_else(|| Error::InvalidSchema {
            path: path.to_string(),
            reason: format!("unresolved $ref {ref_target}"),
        })?;
        return validate_at(&resolved, value, root, path, depth + 1);
    }

    if let Some(t) = schema_obj.get("type") {
        check_type(t, value, path)?;
    }

    if value.is_object() {
        check_object_keywords(&schema_obj, value, root, path, depth)?;
    }
    if value.is_array() {
        check_array_keywords(&schema_obj, value, root, path, depth)?;
    }
    if value.is_number() {
        check_number_keywords(&schema_obj, value, path)?;
    }
    if let Some(s) = value.as_str() {
        check_string_keywords(&schema_obj, &s, path)?;
    }

    check_combinators(&schema_obj, value, root, path, depth)?;

    Ok(())
}

fn resolve_ref(root: &Value, pointer: &str) -> Option<Value> {
    let rest = pointer.strip_prefix("#/")?;
    let mut cur = root.clone();
    for segment in rest.split('/') {
        cur = cur.with_object(|o| o.get(segment).cloned())??;
    }
    Some(cur)
}

fn type_name_matches(name: &str, value: &Value) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "integer" => value.as_int().is_some(),
        // An Int passes `number`; a Time passes `number` too.
        "number" => value.is_number(),
        "string" => value.as_str().is_some(),
        "boolean" => value.as_bool().is_some(),
        "null" => value.is_null(),
        _ => false,
    }
}

fn check_type(type_spec: &Value, value: &Value, path: &str) -> Result<(), Error> {
    let names: Vec<String> = if let Some(s) = type_spec.as_str() {
        vec![s]
    } else if let Some(items) = type_spec.with_array(|a| a.iter().filter_map(|v| v.as_str()).collect()) {
        items
    } else {
        return Err(Error::InvalidSchema {
            path: path.to_string(),
            reason: "`type` must be a string or array of strings".to_string(),
        });
    };
    if names.iter().any(|n| type_name_matches(n, value)) {
        Ok(())
    } else {
        Err(Error::TypeMismatch {
            path: path.to_string(),
            expected: names.join("|"),
            found: value.tag_name().to_string(),
        })
    }
}

fn check_object_keywords(
    schema_obj: &crate::value::ObjectMap,
    value: &Value,
    root: &Value,
    path: &str,
    depth: usize,
) -> Result<(), Error> {
    let map = value.with_object(|o| o.clone()).unwrap();

    if let Some(required) = schema_obj.get("required") {
        if let Some(names) = required.with_array(|a| a.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>()) {
            for name in names {
                if !map.contains_key(&name) {
                    return Err(Error::MissingProperty {
                        path: path.to_string(),
                        property: name,
                    });
                }
            }
        }
    }

    if let Some(min) = schema_obj.get("minProperties").and_then(|v| v.as_int()) {
        if (map.len() as i64) < min {
            return Err(Error::Constraint {
                path: path.to_string(),
                reason: format!("object has fewer than minProperties={min}"),
            });
        }
    }
    if let Some(max) = schema_obj.get("maxProperties").and_then(|v| v.as_int()) {
        if (map.len() as i64) > max {
            return Err(Error::Constraint {
                path: path.to_string(),
                reason: format!("object has more than maxProperties={max}"),
            });
        }
    }

    let properties = schema_obj.get("properties").and_then(|v| v.with_object(|o| o.clone()));
    let pattern_props = schema_obj
        .get("patternProperties")
        .and_then(|v| v.with_object(|o| o.clone()));

    let mut matched: std::collections::HashSet<String> = std::collections::HashSet::new();

    if let Some(props) = &properties {
        for (key, sub_schema) in props.iter() {
            if let Some(child) = map.get(key) {
                matched.insert(key.clone());
                validate_at(sub_schema, child, root, &format!("{path}/{key}"), depth + 1)?;
            }
        }
    }

    if let Some(patterns) = &pattern_props {
        for (pattern, sub_schema) in patterns.iter() {
            for key in map.keys() {
                if regex::matches(pattern, key) {
                    matched.insert(key.clone());
                    validate_at(sub_schema, map.get(key).unwrap(), root, &format!("{path}/{key}"), depth + 1)?;
                }
            }
        }
    }

    if let Some(additional) = schema_obj.get("additionalProperties") {
        for (key, child) in map.iter() {
            if matched.contains(key) {
                continue;
            }
            if let Some(false) = additional.as_bool() {
                return Err(Error::Constraint {
                    path: path.to_string(),
                    reason: format!("additional property {key:?} is not allowed"),
                });
            }
            if additional.is_object() {
                validate_at(additional, child, root, &format!("{path}/{key}"), depth + 1)?;
            }
        }
    }

    if let Some(deps) = schema_obj.get("dependencies").and_then(|v| v.with_object(|o| o.clone())) {
        for (prop, dep) in deps.iter() {
            if !map.contains_key(prop) {
                continue;
            }
            if let Some(names) = dep.with_array(|a| a.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>()) {
                for name in names {
                    if !map.contains_key(&name) {
                        return Err(Error::MissingDependency {
                            path: path.to_string(),
                            property: prop.clone(),
                            depends_on: name,
                        });
                    }
                }
            } else if dep.is_object() {
                validate_at(dep, value, root, path, depth + 1)?;
            }
        }
    }

    Ok(())
}

fn check_array_keywords(
    schema_obj: &crate::value::ObjectMap,
    value: &Value,
    root: &Value,
    path: &str,
    depth: usize,
) -> Result<(), Error> {
    let items_vec = value.with_array(|a| a.clone()).unwrap();

    if let Some(min) = schema_obj.get("minItems").and_then(|v| v.as_int()) {
        if (items_vec.len() as i64) < min {
            return Err(Error::Constraint {
                path: path.to_string(),
                reason: format!("array has fewer than minItems={min}"),
            });
        }
    }
    if let Some(max) = schema_obj.get("maxItems").and_then(|v| v.as_int()) {
        if (items_vec.len() as i64) > max {
            return Err(Error::Constraint {
                path: path.to_string(),
                reason: format!("array has more than maxItems={max}"),
            });
        }
    }

    if let Some(true) = schema_obj.get("uniqueItems").and_then(|v| v.as_bool()) {
        for i in 0..items_vec.len() {
            for j in (i + 1)..items_vec.len() {
                if items_vec[i].deep_eq(&items_vec[j]) {
                    return Err(Error::Constraint {
                        path: path.to_string(),
                        reason: "uniqueItems violated".to_string(),
                    });
                }
            }
        }
    }

    if let Some(items_schema) = schema_obj.get("items") {
        if let Some(list) = items_schema.with_array(|a| a.clone()) {
            for (i, (item, sub)) in items_vec.iter().zip(list.iter()).enumerate() {
                validate_at(sub, item, root, &format!("{path}/{i}"), depth + 1)?;
            }
            if items_vec.len() > list.len() {
                if let Some(additional) = schema_obj.get("additionalItems") {
                    for (i, item) in items_vec.iter().enumerate().skip(list.len()) {
                        if let Some(false) = additional.as_bool() {
                            return Err(Error::Constraint {
                                path: path.to_string(),
                                reason: format!("additional item at index {i} is not allowed"),
                            });
                        }
                        if additional.is_object() {
                            validate_at(additional, item, root, &format!("{path}/{i}"), depth + 1)?;
                        }
                    }
                }
            }
        } else {
            for (i, item) in items_vec.iter().enumerate() {
                validate_at(items_schema, item, root, &format!("{path}/{i}"), depth + 1)?;
            }
        }
    }

    Ok(())
}

fn check_number_keywords(schema_obj: &crate::value::ObjectMap, value: &Value, path: &str) -> Result<(), Error> {
    let n = value.as_float().unwrap();

    if let Some(min) = schema_obj.get("minimum").and_then(|v| v.as_float()) {
        let exclusive = schema_obj.get("exclusiveMinimum").and_then(|v| v.as_bool()).unwrap_or(false);
        let ok = if exclusive { n > min } else { n >= min };
        if !ok {
            return Err(Error::Constraint {
                path: path.to_string(),
                reason: format!("value {n} is below minimum {min} (exclusive={exclusive})"),
            });
        }
    }
    if let Some(max) = schema_obj.get("maximum").and_then(|v| v.as_float()) {
        let exclusive = schema_obj.get("exclusiveMaximum").and_then(|v| v.as_bool()).unwrap_or(false);
        let ok = if exclusive { n < max } else { n <= max };
        if !ok {
            return Err(Error::Constraint {
                path: path.to_string(),
                reason: format!("value {n} is above maximum {max} (exclusive={exclusive})"),
            });
        }
    }
    if let Some(step) = schema_obj.get("multipleOf").and_then(|v| v.as_float()) {
        if step > 0.0 && (n % step).abs() >= 1e-16 {
            return Err(Error::Constraint {
                path: path.to_string(),
                reason: format!("value {n} is not a multiple of {step}"),
            });
        }
    }
    Ok(())
}

fn check_string_keywords(schema_obj: &crate::value::ObjectMap, s: &str, path: &str) -> Result<(), Error> {
    if let Some(min) = schema_obj.get("minLength").and_then(|v| v.as_int()) {
        if (s.chars().count() as i64) < min {
            return Err(Error::Constraint {
                path: path.to_string(),
                reason: format!("string shorter than minLength={min}"),
            });
        }
    }
    if let Some(max) = schema_obj.get("maxLength").and_then(|v| v.as_int()) {
        if (s.chars().count() as i64) > max {
            return Err(Error::Constraint {
                path: path.to_string(),
                reason: format!("string longer than maxLength={max}"),
            });
        }
    }
    if let Some(pattern) = schema_obj.get("pattern").and_then(|v| v.as_str()) {
        if !regex::matches(&pattern, s) {
            return Err(Error::Constraint {
                path: path.to_string(),
                reason: format!("string does not match pattern {pattern:?}"),
            });
        }
    }
    Ok(())
}

fn check_combinators(
    schema_obj: &crate::value::ObjectMap,
    value: &Value,
    root: &Value,
    path: &str,
    depth: usize,
) -> Result<(), Error> {
    if let Some(choices) = schema_obj.get("enum").and_then(|v| v.with_array(|a| a.clone())) {
        if !choices.iter().any(|c| c.deep_eq(value)) {
            return Err(Error::Constraint {
                path: path.to_string(),
                reason: "value does not match any enum choice".to_string(),
            });
        }
    }

    if let Some(subs) = schema_obj.get("allOf").and_then(|v| v.with_array(|a| a.clone())) {
        for (i, s) in subs.iter().enumerate() {
            validate_at(s, value, root, &format!("{path}/allOf/{i}"), depth + 1)?;
        }
    }

    if let Some(subs) = schema_obj.get("anyOf").and_then(|v| v.with_array(|a| a.clone())) {
        let mut ok = false;
        for s in subs.iter() {
            if validate_at(s, value, root, path, depth + 1).is_ok() {
                ok = true;
                break;
            }
        }
        if !ok {
            return Err(Error::Constraint {
                path: path.to_string(),
                reason: "value did not match any anyOf branch".to_string(),
            });
        }
    }

    if let Some(subs) = schema_obj.get("oneOf").and_then(|v| v.with_array(|a| a.clone())) {
        let matches = subs
            .iter()
            .filter(|s| validate_at(s, value, root, path, depth + 1).is_ok())
            .count();
        if matches != 1 {
            return Err(Error::Constraint {
                path: path.to_string(),
                reason: format!("value matched {matches} oneOf branches, expected exactly 1"),
            });
        }
    }

    if let Some(sub) = schema_obj.get("not") {
        if validate_at(sub, value, root, path, depth + 1).is_ok() {
            return Err(Error::Constraint {
                path: path.to_string(),
                reason: "value matched a `not` schema".to_string(),
            });
        }
    }

    Ok(())
}

/// A small recursive-descent matcher for the subset of POSIX extended regular
/// expressions actually used in schema authoring: literals, `.`, `*`, `+`,
/// `?`, character classes, anchors, alternation, and grouping. This is a
/// deliberate scope limit (see SPEC_FULL.md design notes), not a full ERE engine.
pub mod regex {
    pub fn matches(pattern: &str, text: &str) -> bool {
        let pat: Vec<char> = pattern.chars().collect();
        let txt: Vec<char> = text.chars().collect();
        match_alternation(&pat, &txt)
    }

    fn match_alternation(pat: &[char], txt: &[char]) -> bool {
        for branch in split_top_level(pat, '|') {
            if match_anchored(&branch, txt) {
                return true;
            }
        }
        false
    }

    fn match_anchored(pat: &[char], txt: &[char]) -> bool {
        let anchored_start = pat.first() == Some(&'^');
        let pat = if anchored_start { &pat[1..] } else { pat };
        let anchored_end = pat.last() == Some(&'$');
        let pat = if anchored_end { &pat[..pat.len() - 1] } else { pat };

        if anchored_start && anchored_end {
            return match_seq(pat, txt).into_iter().any(|end| end == txt.len());
        }
        if anchored_start {
            return match_seq(pat, txt).into_iter().any(|_| true) || pat.is_empty();
        }
        if anchored_end {
            for start in 0..=txt.len() {
                if match_seq(pat, &txt[start..]).into_iter().any(|end| end == txt.len() - start) {
                    return true;
                }
            }
            return false;
        }
        for start in 0..=txt.len() {
            if !match_seq(pat, &txt[start..]).is_empty() {
                return true;
            }
        }
        false
    }

    fn split_top_level(pat: &[char], sep: char) -> Vec<Vec<char>> {
        let mut out = Vec::new();
        let mut depth = 0i32;
        let mut cur = Vec::new();
        for &c in pat {
            match c {
                '(' => {
                    depth += 1;
                    cur.push(c);
                }
                ')' => {
                    depth -= 1;
                    cur.push(c);
                }
                c if c == sep && depth == 0 => {
                    out.push(std::mem::take(&mut cur));
                }
                c => cur.push(c),
            }
        }
        out.push(cur);
        out
    }

    /// Returns the set of text-positions (lengths consumed) reachable after
    /// matching `pat` against a prefix of `txt`, starting at position 0.
    fn match_seq(pat: &[char], txt: &[char]) -> Vec<usize> {
        let tokens = tokenize(pat);
        let mut positions = vec![0usize];
        for tok in &tokens {
            let mut next = std::collections::BTreeSet::new();
            for &pos in &positions {
                for end in tok.match_lengths(txt, pos) {
                    next.insert(end);
                }
            }
            positions = next.into_iter().collect();
            if positions.is_empty() {
                return positions;
            }
        }
        positions
    }

    enum Atom {
        Literal(char),
        Any,
        Class(Vec<(char, char)>, bool), // ranges, negated
        Group(Vec<Vec<char>>),          // alternation branches, each re-tokenized recursively
    }

    struct Token {
        atom: Atom,
        quantifier: Option<char>, // '*', '+', '?'
    }

    impl Token {
        fn match_lengths(&self, txt: &[char], pos: usize) -> Vec<usize> {
            let one = self.atom_len_at(txt, pos);
            match self.quantifier {
                None => one.into_iter().collect(),
                Some('?') => {
                    let mut v = vec![pos];
                    v.extend(one);
                    v
                }
                Some('*') => star_lengths(self, txt, pos),
                Some('+') => {
                    let mut out = Vec::new();
                    for first in self.atom_len_at(txt, pos) {
                        out.push(first);
                        out.extend(star_lengths(self, txt, first));
                    }
                    out
                }
                _ => one.into_iter().collect(),
            }
        }

        fn atom_len_at(&self, txt: &[char], pos: usize) -> Option<usize> {
            if pos >= txt.len() {
                if let Atom::Group(branches) = &self.atom {
                    return branches.iter().any(|b| b.is_empty()).then_some(pos);
                }
                return None;
            }
            match &self.atom {
                Atom::Literal(c) => (txt[pos] == *c).then_some(pos + 1),
                Atom::Any => Some(pos + 1),
                Atom::Class(ranges, negated) => {
                    let hit = ranges.iter().any(|(lo, hi)| txt[pos] >= *lo && txt[pos] <= *hi);
                    (hit != *negated).then_some(pos + 1)
                }
                Atom::Group(branches) => branches
                    .iter()
                    .flat_map(|b| match_seq(b, &txt[pos..]))
                    .map(|l| pos + l)
                    .max(),
            }
        }
    }

    fn star_lengths(tok: &Token, txt: &[char], start: usize) -> Vec<usize> {
        let mut out = vec![start];
        let mut cur = start;
        while let Some(next) = tok.atom_len_at(txt, cur) {
            if next == cur {
                break;
            }
            cur = next;
            out.push(cur);
        }
        out
    }

    fn tokenize(pat: &[char]) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut i = 0;
        while i < pat.len() {
            let atom = match pat[i] {
                '.' => {
                    i += 1;
                    Atom::Any
                }
                '[' => {
                    let mut j = i + 1;
                    let negated = pat.get(j) == Some(&'^');
                    if negated {
                        j += 1;
                    }
                    let mut ranges = Vec::new();
                    while j < pat.len() && pat[j] != ']' {
                        if j + 2 < pat.len() && pat[j + 1] == '-' && pat[j + 2] != ']' {
                            ranges.push((pat[j], pat[j + 2]));
                            j += 3;
                        } else {
                            ranges.push((pat[j], pat[j]));
                            j += 1;
                        }
                    }
                    i = j + 1;
                    Atom::Class(ranges, negated)
                }
                '(' => {
                    let mut depth = 1;
                    let mut j = i + 1;
                    while j < pat.len() && depth > 0 {
                        match pat[j] {
                            '(' => depth += 1,
                            ')' => depth -= 1,
                            _ => {}
                        }
                        if depth > 0 {
                            j += 1;
                        }
                    }
                    let inner = &pat[i + 1..j];
                    let branches = split_top_level(inner, '|');
                    i = j + 1;
                    Atom::Group(branches)
                }
                '\\' if i + 1 < pat.len() => {
                    let c = pat[i + 1];
                    i += 2;
                    Atom::Literal(c)
                }
                c => {
                    i += 1;
                    Atom::Literal(c)
                }
            };
            let quantifier = match pat.get(i) {
                Some('*') | Some('+') | Some('?') => {
                    let q = pat[i];
                    i += 1;
                    Some(q)
                }
                _ => None,
            };
            tokens.push(Token { atom, quantifier });
        }
        tokens
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Parser, ParserFlags};

    fn parse_json_like(input: &str) -> Value {
        let mut p = Parser::new(ParserFlags::empty());
        p.add_string(input, 0).unwrap();
        p.get_object().unwrap()
    }

    #[test]
    fn e5_integer_range_constraint_violation() {
        let schema = parse_json_like(r#"{"type":"integer","minimum":0,"maximum":255}"#);
        let value = Value::int(300);
        let err = validate(&schema, &value).unwrap_err();
        assert_eq!(err.code(), "Constraint");
        assert!(err.to_string().contains("255"));
    }

    #[test]
    fn e6_additional_properties_false_rejects_unknown_key() {
        let schema = parse_json_like(
            r#"{"type":"object","properties":{"x":{"type":"string"}},"required":["x"],"additionalProperties":false}"#,
        );
        let value = parse_json_like(r#"{"x":"ok","y":1}"#);
        let err = validate(&schema, &value).unwrap_err();
        assert_eq!(err.code(), "Constraint");
        assert!(err.to_string().contains("y"));
    }

    #[test]
    fn e6_without_additional_properties_false_it_passes() {
        let schema = parse_json_like(
            r#"{"type":"object","properties":{"x":{"type":"string"}},"required":["x"]}"#,
        );
        let value = parse_json_like(r#"{"x":"ok","y":1}"#);
        assert!(validate(&schema, &value).is_ok());
    }

    #[test]
    fn boundary_10_unique_items_numeric_equality() {
        let schema = parse_json_like(r#"{"type":"array","items":{"type":"number"},"uniqueItems":true}"#);
        let value = Value::array(vec![Value::int(1), Value::float(1.0)]);
        assert!(validate(&schema, &value).is_err());
    }

    #[test]
    fn exclusive_minimum_flag_form() {
        let schema = parse_json_like(r#"{"type":"number","minimum":0,"exclusiveMinimum":true}"#);
        assert!(validate(&schema, &Value::int(0)).is_err());
        assert!(validate(&schema, &Value::int(1)).is_ok());
    }

    #[test]
    fn ref_resolves_against_root_fragment() {
        let schema = parse_json_like(
            r#"{"properties":{"a":{"$ref":"#/definitions/pos"}},"definitions":{"pos":{"type":"integer","minimum":0}}}"#,
        );
        let good = Value::empty_object();
        good.object_insert("a", Value::int(5));
        assert!(validate(&schema, &good).is_ok());
        let bad = Value::empty_object();
        bad.object_insert("a", Value::int(-5));
        assert!(validate(&schema, &bad).is_err());
    }
}
