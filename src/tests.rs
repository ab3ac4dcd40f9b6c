#[cfg(test)]
use crate::*;

#[cfg(test)]
use std::sync::Arc;

#[cfg(test)]
fn compile_simple(source: &str) -> Result<Pattern, TapasError> {
    compile(source, &SimpleTokenizer::new(), &SimpleExpressions)
}

#[test]
fn tokenize_simple() {
    let tokens = SimpleTokenizer::new().tokenize("Doe, Jane  (1.5 kg) can't");
    let texts: Vec<&str> = tokens.iter().map(|t| t.text()).collect();
    assert_eq!(
        texts,
        vec!["Doe", ",", "Jane", "(", "1.5", "kg", ")", "can't"]
    );
    assert_eq!(tokens[0].whitespace(), "");
    assert_eq!(tokens[1].whitespace(), " ");
    assert_eq!(tokens[2].whitespace(), "  ");
    assert_eq!(tokens[7].whitespace(), "");
}

#[test]
fn annotation_identifier() {
    let annotation = Annotation::new("person", 2, 3);
    assert_eq!(annotation.identifier(), "person@2+3");
    assert_eq!(annotation.end(), 5);
    let annotation = annotation.with_id("P1");
    assert_eq!(annotation.identifier(), "P1");
    let generated = Annotation::new("person", 0, 1).with_generated_id();
    assert!(generated.id().is_some());
    assert_ne!(
        generated.id(),
        Annotation::new("person", 0, 1).with_generated_id().id()
    );
}

#[test]
fn compile_sequence() -> Result<(), TapasError> {
    let pattern = compile_simple("<lastName> ',' <firstName>")?;
    assert_eq!(pattern.elements().len(), 3);
    match pattern.elements()[0].kind() {
        ElementKind::Annotation(matcher) => assert_eq!(matcher.annotationtype(), "lastName"),
        kind => panic!("unexpected element {:?}", kind),
    }
    match pattern.elements()[1].kind() {
        ElementKind::Literal { tokens, .. } => assert_eq!(tokens, &vec![",".to_string()]),
        kind => panic!("unexpected element {:?}", kind),
    }
    assert_eq!(pattern.annotation_types(), vec!["lastName", "firstName"]);
    Ok(())
}

#[test]
fn compile_multitoken_literal() -> Result<(), TapasError> {
    let pattern = compile_simple("'et al.'")?;
    match pattern.elements()[0].kind() {
        ElementKind::Literal { text, tokens } => {
            assert_eq!(text, "et al.");
            assert_eq!(tokens, &vec!["et".to_string(), "al".to_string(), ".".to_string()]);
        }
        kind => panic!("unexpected element {:?}", kind),
    }
    Ok(())
}

#[test]
fn compile_literal_escapes() -> Result<(), TapasError> {
    let pattern = compile_simple(r"'can\'t'")?;
    match pattern.elements()[0].kind() {
        ElementKind::Literal { text, .. } => assert_eq!(text, "can't"),
        kind => panic!("unexpected element {:?}", kind),
    }
    Ok(())
}

#[test]
fn compile_quantifiers() -> Result<(), TapasError> {
    let pattern = compile_simple("<a> <b>? <c>* <d>+ <e>{2} <f>{2,} <g>{1,3} <h>{0,1}")?;
    let bounds: Vec<(usize, usize)> = pattern
        .elements()
        .iter()
        .map(|e| (e.min(), e.max()))
        .collect();
    assert_eq!(
        bounds,
        vec![
            (1, 1),
            (0, 1),
            (0, UNBOUNDED),
            (1, UNBOUNDED),
            (2, 2),
            (2, UNBOUNDED),
            (1, 3),
            (0, 1)
        ]
    );
    Ok(())
}

#[test]
fn compile_invalid_quantifiers() {
    for source in ["'a'{3,2}", "'a'{0}", "'a'{0,0}", "'a'{-1,2}", "'a'{x}", "'a'{2", "'a'+?"] {
        match compile_simple(source) {
            Err(TapasError::PatternSyntaxError(..)) => {}
            other => panic!("expected a syntax error for {}, got {:?}", source, other),
        }
    }
}

#[test]
fn compile_syntax_errors_with_offsets() {
    let cases = [
        ("'abc", 0),
        ("<a> \"[a-z", 4),
        ("(<a> <b>", 0),
        ("<a> <b>)", 7),
        ("<>", 1),
        ("<a> <1x>", 5),
        ("<a", 0),
        ("", 0),
        ("   ", 0),
        ("''", 0),
        ("<a> \"(\"", 4),
        ("<a>@", 3),
        ("<a> | <b>", 4),
        ("()", 1),
    ];
    for (source, offset) in cases {
        match compile_simple(source) {
            Err(e @ TapasError::PatternSyntaxError(..)) => {
                assert_eq!(e.offset(), Some(offset), "offset for {}: {}", source, e)
            }
            other => panic!("expected a syntax error for {}, got {:?}", source, other),
        }
    }
}

#[test]
fn compile_known_types() {
    let options = CompileOptions::new().with_known_types(["person", "separator"]);
    assert!(compile_with_options(
        "<person> <separator> <person>",
        &SimpleTokenizer::new(),
        &SimpleExpressions,
        &options
    )
    .is_ok());
    assert!(matches!(
        compile_with_options(
            "<person> <place>",
            &SimpleTokenizer::new(),
            &SimpleExpressions,
            &options
        ),
        Err(TapasError::PatternSyntaxError(_, 10))
    ));
}

#[test]
fn compile_attribute_constraints() -> Result<(), TapasError> {
    let pattern = compile_simple(r#"<x a="*" b='' c="(p|q)" d="v" e test="$size > 1">"#)?;
    match pattern.elements()[0].kind() {
        ElementKind::Annotation(matcher) => {
            let constraints = matcher.constraints();
            assert_eq!(constraints.len(), 5);
            assert!(constraints[0].test(Some("anything")));
            assert!(!constraints[0].test(None));
            assert!(constraints[1].test(Some("")));
            assert!(constraints[2].test(Some("p")));
            assert!(constraints[2].test(Some("q")));
            assert!(!constraints[2].test(Some("p|q")));
            assert!(constraints[3].test(Some("v")));
            assert!(!constraints[3].test(Some("w")));
            assert!(constraints[4].test(Some("x")));
            assert_eq!(matcher.test().map(|t| t.source()), Some("$size > 1"));
        }
        kind => panic!("unexpected element {:?}", kind),
    }
    Ok(())
}

#[test]
fn compile_invalid_test_expression() {
    match compile_simple(r#"<a> <x test="@a = ">"#) {
        Err(e @ TapasError::PatternSyntaxError(..)) => {
            // the offset points into the expression, past the start of the attribute value
            assert!(e.offset().unwrap_or(0) > 12, "{}", e);
        }
        other => panic!("expected a syntax error, got {:?}", other),
    }
}

#[test]
fn compile_setters() -> Result<(), TapasError> {
    let pattern = compile_simple(
        "<a>@name <b>@first[f]@last[l]@long[m] <c>@(upper($value)):shout[; ] (<d>)+@group",
    )?;
    let setters = pattern.elements()[0].setters();
    assert_eq!(setters.len(), 1);
    assert_eq!(setters[0].name(), "name");
    assert_eq!(setters[0].policy(), &MultiValuePolicy::Join(None));
    assert!(setters[0].expression().is_none());

    let setters = pattern.elements()[1].setters();
    assert_eq!(
        setters.iter().map(|s| s.policy().clone()).collect::<Vec<_>>(),
        vec![
            MultiValuePolicy::First,
            MultiValuePolicy::Last,
            MultiValuePolicy::Longest
        ]
    );

    let setters = pattern.elements()[2].setters();
    assert_eq!(setters[0].name(), "shout");
    assert_eq!(
        setters[0].expression().map(|e| e.source()),
        Some("upper($value)")
    );
    assert_eq!(
        setters[0].policy(),
        &MultiValuePolicy::Join(Some("; ".to_string()))
    );

    assert_eq!(pattern.elements()[3].max(), UNBOUNDED);
    assert_eq!(pattern.elements()[3].setters()[0].name(), "group");
    Ok(())
}

#[test]
fn compile_invalid_setters() {
    for source in ["<a>@(upper(", "<a>@(upper($value))", "<a>@(upper($value)):", "<a>@x[f", "<a>@(nosuchfunction(1)):x"] {
        assert!(
            matches!(compile_simple(source), Err(TapasError::PatternSyntaxError(..))),
            "expected a syntax error for {}",
            source
        );
    }
}

#[test]
fn compile_alternation_structure() -> Result<(), TapasError> {
    let pattern = compile_simple("(<a>|<b> <c>)")?;
    match pattern.elements()[0].kind() {
        ElementKind::Alternative(branches) => {
            assert_eq!(branches.len(), 2);
            assert!(matches!(branches[0].kind(), ElementKind::Annotation(_)));
            match branches[1].kind() {
                ElementKind::Sequence(children) => assert_eq!(children.len(), 2),
                kind => panic!("unexpected branch {:?}", kind),
            }
        }
        kind => panic!("unexpected element {:?}", kind),
    }
    // a parenthesized branch is the same as an unparenthesized one
    assert_eq!(pattern, compile_simple("(<a>|(<b> <c>))")?);
    Ok(())
}

#[test]
fn compile_regex_literal() -> Result<(), TapasError> {
    let pattern = compile_simple(r#""[A-Z]\." <a> "[A-Z]\." "\"q\"""#)?;
    assert_eq!(pattern.regex_literals(), vec![r"[A-Z]\.", "\"q\""]);
    Ok(())
}

#[test]
fn pattern_display_roundtrip() -> Result<(), TapasError> {
    for source in [
        "<lastName> ',' <firstName>",
        r#"<x a="*" b="(p|q)" test="@c = 'v'">+@y[m] 'it\'s'{2,3} "\d+\"?""#,
        "(<a>|<b> <c>|(<d>)?)* <e>{2,}@(concat($value, '!')):z[ \\] ]",
    ] {
        let pattern = compile_simple(source)?;
        let reserialized = pattern.to_string();
        assert_eq!(
            compile_simple(&reserialized)?,
            pattern,
            "{} reserialized as {}",
            source,
            reserialized
        );
    }
    assert_eq!(
        compile_simple("( <a>|<b> <c> )+ 'x'")?.to_string(),
        "(<a>|<b> <c>)+ 'x'"
    );
    Ok(())
}

#[test]
fn explode_and_normalize() {
    let source = "<a> (<b>|'c d')+ @x";
    let exploded = explode_pattern(source);
    assert_eq!(exploded, "<a>\n(\n\t<b>\n|\n\t'c d'\n)+@x\n");
    assert_eq!(normalize_pattern(&exploded), "<a> (<b>|'c d')+@x");
}

#[test]
fn explode_normalize_idempotence() -> Result<(), TapasError> {
    for source in [
        "<lastName> ',' <firstName>",
        "<a>  (  <b> | 'c  d'  | (<e> \"[0-9]+\")? )+ @x[ ; ]",
        r#"<x a = "( p | q )"   test='@c = "v w"'> ('and'|'or')  <y>{1, 3}"#,
        "((<a>|<b>) (<c>|<d>))* <e>@(concat( $value , 'x' )):f",
    ] {
        let pattern = compile_simple(source)?;
        let roundtrip = normalize_pattern(&explode_pattern(source));
        assert_eq!(compile_simple(&roundtrip)?, pattern, "{} => {}", source, roundtrip);
        // normalizing is idempotent on its own as well
        assert_eq!(normalize_pattern(&roundtrip), roundtrip);
    }
    Ok(())
}

#[test]
fn expressions_evaluate() -> Result<(), TapasError> {
    let document = Document::from_text("Doe , Jane", default_tokenizer());
    let annotation = Annotation::new("name", 0, 3).with_attribute("kind", "person");
    let context = ExpressionContext::new(&document, &annotation);
    let engine = SimpleExpressions;
    let cases = [
        ("@kind = 'person'", ExpressionValue::Bool(true)),
        ("@kind != 'person'", ExpressionValue::Bool(false)),
        ("@missing = 'x'", ExpressionValue::Bool(false)),
        ("@missing != 'x'", ExpressionValue::Bool(false)),
        ("$size >= 3 and $start = 0", ExpressionValue::Bool(true)),
        ("$type = 'other' or starts-with($value, 'Doe')", ExpressionValue::Bool(true)),
        ("not(contains($value, 'Jane'))", ExpressionValue::Bool(false)),
        ("$value", ExpressionValue::String("Doe , Jane".to_string())),
        ("upper(substring-before($value, ' ,'))", ExpressionValue::String("DOE".to_string())),
        ("concat(@kind, ':', $size)", ExpressionValue::String("person:3".to_string())),
        ("string-length(@kind)", ExpressionValue::Number(6.0)),
        ("normalize-space('  a   b ')", ExpressionValue::String("a b".to_string())),
        ("'10' > '9'", ExpressionValue::Bool(true)),
    ];
    for (source, expected) in cases {
        let expression = engine.parse(source)?;
        assert_eq!(expression.evaluate(&context)?, expected, "{}", source);
        assert_eq!(expression.source(), source);
    }
    Ok(())
}

#[test]
fn expressions_syntax_errors() {
    let engine = SimpleExpressions;
    for (source, offset) in [
        ("@a = ", 5),
        ("'abc", 0),
        ("$nosuchvariable", 0),
        ("nosuchfunction(1)", 0),
        ("lower('a', 'b')", 0),
        ("(@a = 'b'", 0),
        ("@a 'b'", 3),
        ("@a # 'b'", 3),
    ] {
        match engine.parse(source) {
            Err(TapasError::ExpressionSyntaxError(_, found)) => {
                assert_eq!(found, offset, "offset for {}", source)
            }
            other => panic!("expected a syntax error for {}, got {:?}", source, other.map(|e| e.source().to_string())),
        }
    }
}

#[test]
fn expression_value_truthiness() {
    assert!(!ExpressionValue::Null.as_bool());
    assert!(!ExpressionValue::String(String::new()).as_bool());
    assert!(ExpressionValue::String("0".to_string()).as_bool());
    assert!(!ExpressionValue::Number(0.0).as_bool());
    assert_eq!(ExpressionValue::Number(3.0).as_string(), "3");
    assert_eq!(ExpressionValue::Number(2.5).as_string(), "2.5");
}

#[test]
fn merge_policies() {
    use std::collections::BTreeMap;
    let mut attributes = BTreeMap::new();
    for value in ["a", "ccc", "bb"] {
        merge_value(&mut attributes, "first", value.to_string(), &MultiValuePolicy::First, " ");
        merge_value(&mut attributes, "last", value.to_string(), &MultiValuePolicy::Last, " ");
        merge_value(&mut attributes, "long", value.to_string(), &MultiValuePolicy::Longest, " ");
        merge_value(&mut attributes, "join", value.to_string(), &MultiValuePolicy::Join(None), " ");
        merge_value(
            &mut attributes,
            "sep",
            value.to_string(),
            &MultiValuePolicy::Join(Some(", ".to_string())),
            " ",
        );
    }
    assert_eq!(attributes.get("first").map(|s| s.as_str()), Some("a"));
    assert_eq!(attributes.get("last").map(|s| s.as_str()), Some("bb"));
    assert_eq!(attributes.get("long").map(|s| s.as_str()), Some("ccc"));
    assert_eq!(attributes.get("join").map(|s| s.as_str()), Some("a ccc bb"));
    assert_eq!(attributes.get("sep").map(|s| s.as_str()), Some("a, ccc, bb"));
}

#[test]
fn cache_lru_eviction() -> Result<(), TapasError> {
    let cache = PatternCache::with_capacity(2);
    let tokenizer = SimpleTokenizer::new();
    let a = cache.get_or_compile("<a>", &tokenizer, &SimpleExpressions)?;
    cache.get_or_compile("<b>", &tokenizer, &SimpleExpressions)?;
    // touch <a>, so <b> becomes the least recently used
    let a2 = cache.get_or_compile("<a>", &tokenizer, &SimpleExpressions)?;
    assert!(Arc::ptr_eq(&a, &a2));
    cache.get_or_compile("<c>", &tokenizer, &SimpleExpressions)?;
    assert_eq!(cache.len(), 2);
    assert!(cache.contains("simple", "<a>"));
    assert!(!cache.contains("simple", "<b>"));
    assert!(cache.contains("simple", "<c>"));
    let (hits, misses) = cache.stats();
    assert_eq!(hits, 1);
    assert_eq!(misses, 3);
    Ok(())
}

#[test]
fn cache_disabled() -> Result<(), TapasError> {
    let cache = PatternCache::with_capacity(0);
    let tokenizer = SimpleTokenizer::new();
    let a = cache.get_or_compile("<a>", &tokenizer, &SimpleExpressions)?;
    let a2 = cache.get_or_compile("<a>", &tokenizer, &SimpleExpressions)?;
    assert!(!Arc::ptr_eq(&a, &a2));
    assert_eq!(a, a2);
    assert!(cache.is_empty());
    Ok(())
}

#[test]
fn cache_errors_not_cached() {
    let cache = PatternCache::default();
    let tokenizer = SimpleTokenizer::new();
    assert!(cache
        .get_or_compile("<a", &tokenizer, &SimpleExpressions)
        .is_err());
    assert!(cache.is_empty());
}

#[test]
fn config_json() -> Result<(), TapasError> {
    let config = Config::from_json_str(r#"{ "cache_capacity": 5, "default_separator": "|" }"#)?;
    assert_eq!(config.cache_capacity(), 5);
    assert_eq!(config.default_separator(), "|");
    assert_eq!(config.regex_max_tokens(), 10);
    assert!(!config.debug());
    let json = config.to_json_string(true)?;
    assert_eq!(Config::from_json_str(&json)?, config);
    Ok(())
}
