//! `{name}` placeholder parsing shared by the print and count templates

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum Segment<F> {
    Text(String),
    Field(F),
}

/// Split a template into literal text and fields
///
/// `field` maps a placeholder name to a field. Names it rejects, and braces
/// that never close, stay in the text literally.
pub(super) fn parse_segments<F>(
    template: &str,
    field: impl Fn(&str) -> Option<F>,
) -> Vec<Segment<F>> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        text.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let placeholder = after
            .find('}')
            .and_then(|end| field(&after[..end]).map(|f| (f, end)));

        match placeholder {
            Some((field, end)) => {
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(Segment::Field(field));
                rest = &after[end + 1..];
            }
            None => {
                text.push('{');
                rest = after;
            }
        }
    }
    text.push_str(rest);
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }

    segments
}
