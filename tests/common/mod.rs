#![allow(dead_code)]
use tapas::*;

/// "Doe , Jane" with a last name and a first name
pub fn setup_names() -> Result<Document, TapasError> {
    let document = Document::from_text("Doe , Jane", default_tokenizer())
        .with_annotation(Annotation::new("lastName", 0, 1).with_id("L1"))?
        .with_annotation(Annotation::new("firstName", 2, 1).with_id("F1"))?;
    Ok(document)
}

/// "A , B , C" with three person names and two separators
pub fn setup_enumeration() -> Result<Document, TapasError> {
    let document = Document::from_text("A , B , C", default_tokenizer())
        .with_annotation(Annotation::new("personName", 0, 1).with_id("p1"))?
        .with_annotation(Annotation::new("separator", 1, 1).with_id("s1"))?
        .with_annotation(Annotation::new("personName", 2, 1).with_id("p2"))?
        .with_annotation(Annotation::new("separator", 3, 1).with_id("s2"))?
        .with_annotation(Annotation::new("personName", 4, 1).with_id("p3"))?;
    Ok(document)
}

/// "A , B and C" with three person names, a separator, and an end separator
pub fn setup_enumeration_with_end() -> Result<Document, TapasError> {
    let document = Document::from_text("A , B and C", default_tokenizer())
        .with_annotation(Annotation::new("personName", 0, 1).with_id("p1"))?
        .with_annotation(Annotation::new("separator", 1, 1).with_id("s1"))?
        .with_annotation(Annotation::new("personName", 2, 1).with_id("p2"))?
        .with_annotation(Annotation::new("endSeparator", 3, 1).with_id("s2"))?
        .with_annotation(Annotation::new("personName", 4, 1).with_id("p3"))?;
    Ok(document)
}

/// "a bb c" with a word annotation on every token, the first and last carry a `v` attribute
pub fn setup_words() -> Result<Document, TapasError> {
    let document = Document::from_text("a bb c", default_tokenizer())
        .with_annotation(Annotation::new("w", 0, 1).with_attribute("v", "x"))?
        .with_annotation(Annotation::new("w", 1, 1))?
        .with_annotation(Annotation::new("w", 2, 1).with_attribute("v", "z"))?;
    Ok(document)
}

/// "J . Smith wrote 42 pages" with a few annotations
pub fn setup_citation() -> Result<Document, TapasError> {
    let document = Document::from_text("J . Smith wrote 42 pages", default_tokenizer())
        .with_annotation(
            Annotation::new("person", 0, 3)
                .with_id("P1")
                .with_attribute("gender", "m"),
        )?
        .with_annotation(Annotation::new("surname", 2, 1).with_id("S1"))?
        .with_annotation(Annotation::new("number", 4, 1).with_id("N1"))?;
    Ok(document)
}

/// Builds an index over the annotations of a document
pub fn index_for(document: &Document) -> AnnotationIndex {
    AnnotationIndex::from_annotations(document.annotations().cloned())
}

/// Returns the spans of matches as (begin, end) pairs
pub fn spans(matches: &[PatternMatch]) -> Vec<(usize, usize)> {
    matches.iter().map(|m| (m.begin(), m.end())).collect()
}
