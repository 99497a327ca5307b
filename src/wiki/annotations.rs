//! Wikitext annotation handling for comment pages.
//!
//! Head comments carry their display title inside the page body as a
//! `{{DISPLAYTITLE:…}}` directive. The directive (and any other template
//! markup) must not leak into forum posts.

use once_cell::sync::Lazy;
use regex::Regex;

static TEMPLATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{[^}]+\}\}").expect("template regex"));

/// Append the display-title directive a head comment carries on the wiki.
#[must_use]
pub fn add_annotations(wikitext: &str, title: &str) -> String {
    format!("{wikitext}{{{{DISPLAYTITLE:\n{title}\n}}}}")
}

/// Remove the display-title directive for the given title.
///
/// Exact inverse of [`add_annotations`] for the same title.
#[must_use]
pub fn strip_annotations(wikitext: &str, title: &str) -> String {
    let directive = format!("{{{{DISPLAYTITLE:\n{title}\n}}}}");
    wikitext.replace(&directive, "")
}

/// Strip any residual `{{…}}` template markup before posting to the forum.
#[must_use]
pub fn strip_templates(wikitext: &str) -> String {
    TEMPLATE_RE.replace_all(wikitext, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotation_round_trip() {
        let bodies = ["", "A plain comment.", "Multi\nline\nbody"];
        let titles = ["Irrigation", "A title: with, punctuation"];
        for body in bodies {
            for title in titles {
                assert_eq!(strip_annotations(&add_annotations(body, title), title), body);
            }
        }
    }

    #[test]
    fn test_strip_annotations_ignores_other_titles() {
        let annotated = add_annotations("body", "Actual");
        assert_eq!(strip_annotations(&annotated, "Other"), annotated);
    }

    #[test]
    fn test_strip_templates() {
        assert_eq!(
            strip_templates("Before {{Infobox|x=1}} after {{clear}}"),
            "Before  after "
        );
    }

    #[test]
    fn test_strip_templates_leaves_plain_text() {
        assert_eq!(strip_templates("No markup here"), "No markup here");
    }
}
