use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tapas::*;

mod common;
use crate::common::*;

#[test]
fn match_names() -> Result<(), TapasError> {
    let document = setup_names()?;
    let index = index_for(&document);
    let matcher = PatternMatcher::default();
    let matches = matcher.find_matches(&document, &index, "<lastName> ',' <firstName>")?;
    assert_eq!(spans(&matches), vec![(0, 3)]);
    let tree = matches[0].tree();
    assert!(tree.element().is_none());
    assert_eq!(tree.children().len(), 3);
    let matched: Vec<&str> = tree
        .annotations()
        .into_iter()
        .map(|a| a.annotationtype())
        .collect();
    assert_eq!(matched, vec!["lastName", "firstName"]);
    assert_eq!(tree.leaves().len(), 3);
    Ok(())
}

#[test]
fn match_names_through_document_source() -> Result<(), TapasError> {
    let document = Rc::new(setup_names()?);
    let index = AnnotationIndex::from_source(document.clone());
    let matcher = PatternMatcher::default();
    let matches = matcher.find_matches(document.as_ref(), &index, "<lastName> ',' <firstName>")?;
    assert_eq!(spans(&matches), vec![(0, 3)]);
    index.dispose(false);
    Ok(())
}

#[test]
fn optional_only_yields_nothing() -> Result<(), TapasError> {
    let document = setup_names()?;
    let index = index_for(&document);
    let matcher = PatternMatcher::default();
    assert!(matcher.find_matches(&document, &index, "<x>?")?.is_empty());
    assert!(matcher.find_matches(&document, &index, "<x>* 'nothing'?")?.is_empty());
    Ok(())
}

#[test]
fn no_zero_width_matches() -> Result<(), TapasError> {
    let document = setup_names()?;
    let index = index_for(&document);
    let matcher = PatternMatcher::default();
    let matches = matcher.find_matches(&document, &index, "<lastName>? ','? (<firstName>)*")?;
    assert!(!matches.is_empty());
    assert!(matches.iter().all(|m| m.size() > 0));
    Ok(())
}

#[test]
fn quantifier_bounds() -> Result<(), TapasError> {
    let document = Document::from_text("a a a a b", default_tokenizer());
    let index = AnnotationIndex::new();
    let matcher = PatternMatcher::default();
    let matches = matcher.find_matches(&document, &index, "'a'{2,3}")?;
    assert_eq!(
        spans(&matches),
        vec![(0, 3), (0, 2), (1, 4), (1, 3), (2, 4)]
    );
    for m in matches.iter() {
        // one leaf per repetition
        assert_eq!(m.tree().children().len(), m.size());
    }

    let single = Document::from_text("a", default_tokenizer());
    assert!(matcher.find_matches(&single, &index, "'a'{2,3}")?.is_empty());
    Ok(())
}

#[test]
fn long_repetitions() -> Result<(), TapasError> {
    let mut text = String::from("x");
    for _ in 0..20000 {
        text += " a";
    }
    text += " b";
    let document = Document::from_text(&text, default_tokenizer());
    let index = AnnotationIndex::new();
    let matcher = PatternMatcher::default();
    let matches = matcher.find_matches(&document, &index, "'x' 'a'+ 'b'")?;
    assert_eq!(spans(&matches), vec![(0, 20002)]);
    assert_eq!(matches[0].tree().children().len(), 20002);

    // the same through a repeated group, one internal node per repetition
    let matches = matcher.find_matches(&document, &index, "'x' ('a')+ 'b'")?;
    assert_eq!(spans(&matches), vec![(0, 20002)]);
    assert_eq!(matches[0].tree().children().len(), 20002);
    assert!(matches!(
        matches[0].tree().children()[1],
        MatchTree::Internal { begin: 1, end: 2, .. }
    ));
    Ok(())
}

#[test]
fn quantified_group() -> Result<(), TapasError> {
    let document = Document::from_text("x y x y x", default_tokenizer());
    let index = AnnotationIndex::new();
    let matcher = PatternMatcher::default();
    let matches = matcher.find_matches(&document, &index, "('x' 'y')+ 'x'")?;
    assert_eq!(spans(&matches), vec![(0, 5), (0, 3), (2, 5)]);
    let longest = &matches[0];
    assert_eq!(longest.tree().children().len(), 3);
    assert!(matches!(
        longest.tree().children()[0],
        MatchTree::Internal { begin: 0, end: 2, .. }
    ));
    Ok(())
}

#[test]
fn wildcard_attribute() -> Result<(), TapasError> {
    let document = Document::from_text("p q", default_tokenizer())
        .with_annotation(Annotation::new("x", 0, 1).with_attribute("a", "1"))?
        .with_annotation(Annotation::new("x", 1, 1))?;
    let index = index_for(&document);
    let matcher = PatternMatcher::default();
    assert_eq!(
        spans(&matcher.find_matches(&document, &index, "<x a=\"*\">")?),
        vec![(0, 1)]
    );
    assert_eq!(
        spans(&matcher.find_matches(&document, &index, "<x a=\"(0|1)\">")?),
        vec![(0, 1)]
    );
    assert!(matcher
        .find_matches(&document, &index, "<x a=\"2\">")?
        .is_empty());
    assert_eq!(
        spans(&matcher.find_matches(&document, &index, "<x>")?),
        vec![(0, 1), (1, 2)]
    );
    Ok(())
}

#[test]
fn test_expression() -> Result<(), TapasError> {
    let document = setup_citation()?;
    let index = index_for(&document);
    let matcher = PatternMatcher::default();
    assert_eq!(
        spans(&matcher.find_matches(&document, &index, "<person test=\"@gender = 'm' and $size = 3\">")?),
        vec![(0, 3)]
    );
    assert!(matcher
        .find_matches(&document, &index, "<person test=\"@gender = 'f'\">")?
        .is_empty());
    // evaluation errors count as a failed test
    assert!(matcher
        .find_matches(&document, &index, "<person test=\"substring($value, 'x')\">")?
        .is_empty());
    Ok(())
}

#[test]
fn alternation_explores_all_branches() -> Result<(), TapasError> {
    let document = Document::from_text("p q", default_tokenizer())
        .with_annotation(Annotation::new("a", 0, 1))?
        .with_annotation(Annotation::new("b", 0, 1))?;
    let index = index_for(&document);
    let matcher = PatternMatcher::default();
    let matches = matcher.find_matches(&document, &index, "(<a>|<b>)")?;
    assert_eq!(spans(&matches), vec![(0, 1), (0, 1)]);
    let types: Vec<&str> = matches
        .iter()
        .flat_map(|m| m.tree().annotations())
        .map(|a| a.annotationtype())
        .collect();
    assert_eq!(types, vec!["a", "b"]);
    Ok(())
}

#[test]
fn multitoken_literal() -> Result<(), TapasError> {
    let document = setup_citation()?;
    let index = index_for(&document);
    let matcher = PatternMatcher::default();
    assert_eq!(
        spans(&matcher.find_matches(&document, &index, "'J. Smith'")?),
        vec![(0, 3)]
    );
    assert_eq!(
        spans(&matcher.find_matches(&document, &index, "'J .' <surname>")?),
        vec![(0, 3)]
    );
    Ok(())
}

#[test]
fn regex_literals() -> Result<(), TapasError> {
    let document = setup_citation()?;
    let index = index_for(&document);
    let matcher = PatternMatcher::default();
    assert_eq!(
        spans(&matcher.find_matches(&document, &index, r#""\d+" 'pages'"#)?),
        vec![(4, 6)]
    );
    // regular expressions may span multiple tokens, with the whitespace in between
    let matches = matcher.find_matches(&document, &index, r#""J \. Smith""#)?;
    assert_eq!(spans(&matches), vec![(0, 3)]);
    assert_eq!(
        matches[0].tree().annotations()[0].annotationtype(),
        regex_type(r"J \. Smith")
    );
    // ... but not across more tokens than configured
    let limited = PatternMatcher::new(Config::default().with_regex_max_tokens(2));
    assert!(limited
        .find_matches(&document, &index, r#""J \. Smith""#)?
        .is_empty());
    // regular expressions must match entirely
    assert!(matcher
        .find_matches(&document, &index, r#""\d""#)?
        .is_empty());
    Ok(())
}

#[test]
fn match_attributes_from_setters() -> Result<(), TapasError> {
    let document = setup_names()?;
    let index = index_for(&document);
    let matcher = PatternMatcher::default();
    let annotations = matcher.find_annotations(
        &document,
        &index,
        "<lastName>@last ',' <firstName>@(upper($value)):first",
        "name",
    )?;
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].annotationtype(), "name");
    assert_eq!(annotations[0].begin(), 0);
    assert_eq!(annotations[0].size(), 3);
    assert_eq!(annotations[0].attribute("last"), Some("Doe"));
    assert_eq!(annotations[0].attribute("first"), Some("JANE"));
    Ok(())
}

#[test]
fn find_annotations_reports_each_annotation_once() -> Result<(), TapasError> {
    let document = Document::from_text("p q", default_tokenizer())
        .with_annotation(Annotation::new("a", 0, 1))?
        .with_annotation(Annotation::new("b", 0, 1).with_attribute("v", "1"))?;
    let index = index_for(&document);
    let matcher = PatternMatcher::default();
    // both branches yield the same span without attributes
    let annotations = matcher.find_annotations(&document, &index, "(<a>|<b>)", "ab")?;
    assert_eq!(annotations.len(), 1);
    assert_eq!(matcher.find_matches(&document, &index, "(<a>|<b>)")?.len(), 2);
    // attributes tell them apart
    let annotations = matcher.find_annotations(&document, &index, "(<a>|<b>@(@v):v)", "ab")?;
    assert_eq!(annotations.len(), 2);
    assert_eq!(annotations[0].attribute("v"), None);
    assert_eq!(annotations[1].attribute("v"), Some("1"));
    Ok(())
}

#[test]
fn multi_value_policies() -> Result<(), TapasError> {
    let document = setup_words()?;
    let index = index_for(&document);
    let matcher = PatternMatcher::default();
    let matches = matcher.find_matches(&document, &index, "<w>{3}@f[f]@l[l]@m[m]@j@s[,]")?;
    assert_eq!(matches.len(), 1);
    let m = &matches[0];
    assert_eq!(m.attribute("f"), Some("a"));
    assert_eq!(m.attribute("l"), Some("c"));
    assert_eq!(m.attribute("m"), Some("bb"));
    assert_eq!(m.attribute("j"), Some("a bb c"));
    assert_eq!(m.attribute("s"), Some("a,bb,c"));
    Ok(())
}

#[test]
fn configured_default_separator() -> Result<(), TapasError> {
    let document = setup_words()?;
    let index = index_for(&document);
    let matcher = PatternMatcher::new(Config::default().with_default_separator("+"));
    let matches = matcher.find_matches(&document, &index, "<w>{3}@j")?;
    assert_eq!(matches[0].attribute("j"), Some("a+bb+c"));
    Ok(())
}

#[test]
fn falsy_setter_expressions_are_skipped() -> Result<(), TapasError> {
    let document = setup_words()?;
    let index = index_for(&document);
    let matcher = PatternMatcher::default();
    let matches = matcher.find_matches(&document, &index, "<w>{3}@(@v):vals @(@nothing):none")?;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].attribute("vals"), Some("x z"));
    assert_eq!(matches[0].attribute("none"), None);
    Ok(())
}

#[test]
fn group_setters_and_lineage() -> Result<(), TapasError> {
    let document = setup_words()?;
    let index = index_for(&document);
    let matcher = PatternMatcher::default();
    let matches = matcher.find_matches(&document, &index, "(<w>@inner <w>)@pair")?;
    assert_eq!(spans(&matches), vec![(0, 2), (1, 3)]);
    assert_eq!(matches[0].attribute("pair"), Some("a bb"));
    assert_eq!(matches[0].attribute("inner"), Some("a"));
    assert_eq!(matches[1].attribute("pair"), Some("bb c"));
    // values of abandoned attempts do not leak into other matches
    assert_eq!(matches[1].attribute("inner"), Some("bb"));
    Ok(())
}

#[test]
fn determinism() -> Result<(), TapasError> {
    let document = setup_citation()?;
    let index = index_for(&document);
    let matcher = PatternMatcher::default();
    let pattern = "(<person>|<surname>|\"[A-Z]\")+ ('wrote'|\"\\w+\")*@words";
    let first = matcher.find_matches(&document, &index, pattern)?;
    let second = matcher.find_matches(&document, &index, pattern)?;
    assert!(!first.is_empty());
    assert_eq!(first, second);
    for pair in first.windows(2) {
        assert!(
            pair[0].begin() < pair[1].begin()
                || (pair[0].begin() == pair[1].begin() && pair[0].size() >= pair[1].size())
        );
    }
    Ok(())
}

#[test]
fn pattern_errors_surface() -> Result<(), TapasError> {
    let document = setup_names()?;
    let index = index_for(&document);
    let matcher = PatternMatcher::default();
    match matcher.find_matches(&document, &index, "<lastName> 'unterminated") {
        Err(TapasError::PatternSyntaxError(_, offset)) => assert_eq!(offset, 11),
        other => panic!("expected a syntax error, got {:?}", other),
    }
    Ok(())
}

#[test]
fn compiled_patterns_are_cached() -> Result<(), TapasError> {
    let matcher = PatternMatcher::default();
    let tokenizer = SimpleTokenizer::new();
    let a = matcher.compile("<a> <b>", &tokenizer)?;
    let b = matcher.compile("<a> <b>", &tokenizer)?;
    assert!(Arc::ptr_eq(&a, &b));

    let shared = Arc::new(PatternCache::new(Config::default()));
    let one = PatternMatcher::default().with_cache(shared.clone());
    let two = PatternMatcher::default().with_cache(shared.clone());
    one.compile("<c>", &tokenizer)?;
    two.compile("<c>", &tokenizer)?;
    assert_eq!(shared.len(), 1);
    assert_eq!(shared.stats(), (1, 1));
    Ok(())
}

#[test]
fn interrupted_matching() -> Result<(), TapasError> {
    let document = setup_names()?;
    let index = index_for(&document);
    let matcher =
        PatternMatcher::default().with_interrupt(Arc::new(AtomicBool::new(true)));
    assert!(matcher.find_matches(&document, &index, "<lastName>")?.is_empty());
    Ok(())
}

#[test]
fn enumeration_scenario() -> Result<(), TapasError> {
    let document = setup_enumeration()?;
    let persons = document.annotations_of_type("personName");
    let separators = document.annotations_of_type("separator");
    let matcher = PatternMatcher::default();
    let enumerations = matcher.enumerations(
        &document,
        &EnumerationInput::new()
            .with_start_elements(persons.clone())
            .with_elements(persons)
            .with_separators(separators),
    )?;
    assert_eq!(enumerations.len(), 1);
    let enumeration = &enumerations[0];
    assert_eq!(enumeration.annotationtype(), ENUMERATION_TYPE);
    assert_eq!((enumeration.begin(), enumeration.end()), (0, 5));
    assert_eq!(enumeration.attribute(MEMBERS_ATTRIBUTE), Some("p1 p2 p3"));
    assert_eq!(enumeration.attribute(SIZE_ATTRIBUTE), Some("3"));
    Ok(())
}

#[test]
fn enumeration_with_end_separator() -> Result<(), TapasError> {
    let document = setup_enumeration_with_end()?;
    let persons = document.annotations_of_type("personName");
    let matcher = PatternMatcher::default();
    let enumerations = EnumerationAssembler::new(&matcher).enumerations(
        &document,
        &persons,
        &persons,
        &[],
        &document.annotations_of_type("separator"),
        &document.annotations_of_type("endSeparator"),
    )?;
    assert_eq!(enumerations.len(), 1);
    assert_eq!((enumerations[0].begin(), enumerations[0].end()), (0, 5));
    assert_eq!(enumerations[0].attribute(MEMBERS_ATTRIBUTE), Some("p1 p2 p3"));
    Ok(())
}

#[test]
fn enumeration_without_separators() -> Result<(), TapasError> {
    let document = setup_enumeration()?;
    let persons = document.annotations_of_type("personName");
    let matcher = PatternMatcher::default();
    let enumerations = matcher.enumerations(
        &document,
        &EnumerationInput::new()
            .with_start_elements(persons.clone())
            .with_elements(persons),
    )?;
    // every element stands on its own
    assert_eq!(enumerations.len(), 3);
    let members: Vec<&str> = enumerations
        .iter()
        .filter_map(|e| e.attribute(MEMBERS_ATTRIBUTE))
        .collect();
    assert_eq!(members, vec!["p1", "p2", "p3"]);
    assert!(enumerations
        .iter()
        .all(|e| e.attribute(SIZE_ATTRIBUTE) == Some("1")));
    Ok(())
}

#[test]
fn enumeration_with_lone_element() -> Result<(), TapasError> {
    let document = setup_enumeration()?;
    let persons = document.annotations_of_type("personName");
    // only the first separator counts, the last name is not connected
    let separators: Vec<Annotation> = document
        .annotations_of_type("separator")
        .into_iter()
        .take(1)
        .collect();
    let matcher = PatternMatcher::default();
    let enumerations = matcher.enumerations(
        &document,
        &EnumerationInput::new()
            .with_start_elements(persons.clone())
            .with_elements(persons)
            .with_separators(separators),
    )?;
    let found: Vec<(usize, usize, Option<&str>)> = enumerations
        .iter()
        .map(|e| (e.begin(), e.end(), e.attribute(MEMBERS_ATTRIBUTE)))
        .collect();
    assert_eq!(found, vec![(0, 3, Some("p1 p2")), (4, 5, Some("p3"))]);
    Ok(())
}

#[test]
fn enumeration_max_rounds() -> Result<(), TapasError> {
    let document = setup_enumeration()?;
    let persons = document.annotations_of_type("personName");
    let matcher = PatternMatcher::new(Config::default().with_enumeration_max_rounds(1));
    let enumerations = matcher.enumerations(
        &document,
        &EnumerationInput::new()
            .with_start_elements(persons.clone())
            .with_elements(persons)
            .with_separators(document.annotations_of_type("separator")),
    )?;
    // one round of growth, the closing pass adds one more element
    assert_eq!(enumerations.len(), 1);
    assert_eq!(enumerations[0].attribute(SIZE_ATTRIBUTE), Some("3"));
    Ok(())
}

#[test]
fn index_buckets() {
    let index = AnnotationIndex::new();
    assert!(index.add(Annotation::new("x", 0, 2).with_id("first")));
    assert!(!index.add(Annotation::new("x", 0, 2).with_id("second")));
    assert!(index.add(Annotation::new("x", 0, 1).with_id("third")));
    assert!(index.add_as(Annotation::new("y", 0, 1).with_id("fourth"), "x2"));
    let found: Vec<String> = index
        .annotations("x", 0)
        .iter()
        .map(|a| a.identifier().into_owned())
        .collect();
    assert_eq!(found, vec!["first", "third"]);
    assert_eq!(index.annotations("x2", 0)[0].annotationtype(), "y");
    assert!(index.annotations("x", 1).is_empty());
    assert!(index.annotations("unknown", 0).is_empty());
    assert_eq!(index.annotation_types(), vec!["x", "x2"]);
    assert_eq!(index.len(), 3);
    assert!(index.remove(&Annotation::new("x", 0, 2).with_id("first")));
    assert!(!index.remove(&Annotation::new("x", 0, 2).with_id("first")));
    assert_eq!(index.len(), 2);
}

#[test]
fn index_parent_chain() {
    let parent = Rc::new(AnnotationIndex::from_annotations(vec![
        Annotation::new("x", 0, 2).with_id("parent2"),
        Annotation::new("x", 0, 3).with_id("parent3"),
    ]));
    let child = AnnotationIndex::new().with_parent(parent.clone());
    child.add(Annotation::new("x", 0, 1).with_id("child1"));
    child.add(Annotation::new("x", 0, 2).with_id("child2"));
    let found: Vec<String> = child
        .annotations("x", 0)
        .iter()
        .map(|a| a.identifier().into_owned())
        .collect();
    assert_eq!(found, vec!["child1", "child2", "parent3"]);
    // the child never touches its parent
    assert_eq!(parent.len(), 2);
    assert_eq!(parent.annotations("x", 0).len(), 2);

    child.dispose(false);
    assert!(child.is_disposed());
    assert!(child.annotations("x", 0).is_empty());
    assert!(!parent.is_disposed());

    let child = AnnotationIndex::new().with_parent(parent.clone());
    child.dispose(true);
    assert!(parent.is_disposed());
    assert!(parent.annotations("x", 0).is_empty());
}

#[test]
fn observing_index() -> Result<(), TapasError> {
    let document = Rc::new(RefCell::new(Document::from_text(
        "Jane met John",
        default_tokenizer(),
    )));
    let jane = document
        .borrow_mut()
        .annotate(Annotation::new("person", 0, 1))?;
    let index = ObservingIndex::new(document.clone());
    assert_eq!(index.annotations("person", 0).len(), 1);

    // patched into a type that was requested before
    document
        .borrow_mut()
        .annotate(Annotation::new("person", 2, 1))?;
    assert_eq!(index.annotations("person", 2).len(), 1);

    // retyping moves the annotation between types
    document.borrow_mut().retype_annotation(&jane, "speaker")?;
    assert!(index.annotations("person", 0).is_empty());
    assert_eq!(index.annotations("speaker", 0).len(), 1);

    // attribute changes are reflected
    document
        .borrow_mut()
        .set_annotation_attribute(&jane, "role", "subject")?;
    assert_eq!(
        index.annotations("speaker", 0)[0].attribute("role"),
        Some("subject")
    );

    // token edits shift everything
    document.borrow_mut().insert_tokens(0, "Yesterday ,")?;
    assert!(index.annotations("speaker", 0).is_empty());
    assert_eq!(index.annotations("speaker", 2).len(), 1);
    assert_eq!(index.annotations("person", 4).len(), 1);

    // matching through the observing index
    let matcher = PatternMatcher::default();
    let matches = matcher.find_matches(&*document.borrow(), &index, "<speaker> 'met' <person>")?;
    assert_eq!(spans(&matches), vec![(2, 5)]);

    document.borrow_mut().remove_annotation(&jane)?;
    assert!(index.annotations("speaker", 2).is_empty());

    index.dispose();
    assert!(index.annotations("person", 4).is_empty());
    Ok(())
}

#[test]
fn observing_index_same_span() -> Result<(), TapasError> {
    let document = Rc::new(RefCell::new(
        Document::from_text("p q", default_tokenizer())
            .with_annotation(Annotation::new("x", 0, 1).with_id("X1"))?
            .with_annotation(Annotation::new("x", 0, 1).with_id("X2"))?
            .with_annotation(Annotation::new("x", 0, 1).with_id("X3"))?,
    ));
    let ids = |index: &ObservingIndex, annotationtype: &str| -> Vec<String> {
        index
            .annotations(annotationtype, 0)
            .iter()
            .map(|a| a.identifier().into_owned())
            .collect()
    };
    let index = ObservingIndex::new(document.clone());
    assert_eq!(ids(&index, "x"), vec!["X1"]);

    // removing the visible annotation brings up the next one of the same span
    document.borrow_mut().remove_annotation("X1")?;
    assert_eq!(ids(&index, "x"), vec!["X2"]);

    // so does retyping it
    document.borrow_mut().retype_annotation("X2", "y")?;
    assert_eq!(ids(&index, "x"), vec!["X3"]);
    assert_eq!(ids(&index, "y"), vec!["X2"]);

    // removing a shadowed annotation changes nothing visible
    document
        .borrow_mut()
        .annotate(Annotation::new("x", 0, 1).with_id("X4"))?;
    document.borrow_mut().remove_annotation("X4")?;
    assert_eq!(ids(&index, "x"), vec!["X3"]);

    let fresh = ObservingIndex::new(document.clone());
    assert_eq!(ids(&fresh, "x"), ids(&index, "x"));
    assert_eq!(ids(&fresh, "y"), ids(&index, "y"));

    document.borrow_mut().remove_annotation("X3")?;
    assert!(ids(&index, "x").is_empty());
    Ok(())
}

#[test]
fn document_token_edits() -> Result<(), TapasError> {
    let mut document = Document::from_text("a b c d", default_tokenizer());
    let spanning = document.annotate(Annotation::new("x", 1, 2))?;
    let after = document.annotate(Annotation::new("y", 3, 1))?;
    let inside = document.annotate(Annotation::new("z", 2, 1))?;
    let events = document.subscribe();

    assert_eq!(document.insert_tokens(2, "q r")?, 2);
    assert_eq!(document.text_of(0, document.len()), "a b q r c d");
    assert_eq!(document.annotation(&spanning).map(|a| (a.begin(), a.size())), Some((1, 4)));
    assert_eq!(document.annotation(&after).map(|a| (a.begin(), a.size())), Some((5, 1)));
    assert_eq!(document.annotation(&inside).map(|a| (a.begin(), a.size())), Some((4, 1)));
    assert_eq!(events.try_recv().ok(), Some(DocumentEvent::TokensChanged));

    document.remove_tokens(3, 2)?;
    assert_eq!(document.text_of(0, document.len()), "a b q d");
    assert_eq!(document.annotation(&spanning).map(|a| (a.begin(), a.size())), Some((1, 2)));
    assert!(document.annotation(&inside).is_none());
    assert_eq!(document.annotation(&after).map(|a| (a.begin(), a.size())), Some((3, 1)));
    assert!(matches!(events.try_recv(), Ok(DocumentEvent::AnnotationRemoved(_))));
    assert_eq!(events.try_recv().ok(), Some(DocumentEvent::TokensChanged));

    assert!(document.annotate(Annotation::new("x", 3, 2)).is_err());
    assert!(document.remove_tokens(3, 5).is_err());
    assert!(document.remove_tokens(1, usize::MAX).is_err());
    assert_eq!(document.len(), 4);
    Ok(())
}

#[test]
fn document_json_roundtrip() -> Result<(), TapasError> {
    let mut document = setup_citation()?;
    document.set_token_flag(5, "paragraph_end")?;
    let json = document.to_json_string(true)?;
    let loaded = Document::from_json_str(&json)?;
    assert_eq!(loaded.tokens(), document.tokens());
    assert_eq!(
        loaded.annotations().collect::<Vec<_>>(),
        document.annotations().collect::<Vec<_>>()
    );
    assert!(loaded.tokens()[5].has_flag("paragraph_end"));
    assert_eq!(loaded.annotation_types(), vec!["number", "person", "surname"]);
    Ok(())
}

#[test]
fn batch_over_documents() -> Result<(), TapasError> {
    let documents = vec![setup_names()?, setup_citation()?, setup_names()?];
    let matcher = PatternMatcher::default();
    let results = matcher.find_annotations_in_documents(
        &documents,
        "<lastName> ',' <firstName>",
        "name",
    )?;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].len(), 1);
    assert!(results[1].is_empty());
    assert_eq!(results[2], results[0]);
    Ok(())
}
