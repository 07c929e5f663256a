//! Style derivation for style-bearing inline elements (`font`, `b`, `i`,
//! `u`, `strike`, `sup`, `sub`, `run`).
//!
//! Merge rules: set-union for style marks, right-bias overwrite for scalar
//! attributes, list-union for `fx` — all implemented by
//! [`dxl_core::ndoc::StyleAttrs::merged_with`]; this module only derives the
//! contribution of a single element.

use dxl_core::ndoc::{Effect, Script, StyleAttrs, StyleMark};
use roxmltree::Node;
use std::collections::BTreeSet;

/// One element's style contribution: marks plus attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleContribution {
    pub marks: BTreeSet<StyleMark>,
    pub attrs: StyleAttrs,
}

impl StyleContribution {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty() && self.attrs.is_empty()
    }
}

/// Derives the style contribution of a generic style-bearing tag
/// (`b`/`i`/`u`/`strike`/`sup`/`sub`/`run`, or a bare `style="bold,italic"`
/// attribute on any element).
#[must_use]
pub fn style_from_generic_tag(node: Node) -> StyleContribution {
    let mut contribution = match roxmltree_local_name(node) {
        "font" => style_from_font(node),
        "b" => mark_only(StyleMark::Bold),
        "i" => mark_only(StyleMark::Italic),
        "u" => mark_only(StyleMark::Underline),
        "strike" => mark_only(StyleMark::Strike),
        "sup" => script_only(Script::Super, Effect::Super),
        "sub" => script_only(Script::Sub, Effect::Sub),
        _ => StyleContribution::default(),
    };

    if let Some(highlight) = node.attribute("highlight") {
        contribution.attrs.bgcolor = Some(highlight.to_string());
    }
    if let Some(style) = node.attribute("style") {
        apply_style_word_list(style, &mut contribution.marks, &mut contribution.attrs.fx);
    }

    contribution
}

/// Derives style from a `<font>` element's attributes: `color`, `size`,
/// `bgcolor` (falling back to `background`/`highlight`), `name` ->
/// `font_family`, the space/comma-separated `style` word list (including
/// `shadow`/`emboss`/`extrude` effect words), and superscript/subscript
/// (from a `superscript`/`subscript` style word or a `baseline`/`position`
/// attribute).
#[must_use]
pub fn style_from_font(node: Node) -> StyleContribution {
    let mut contribution = StyleContribution::default();
    if let Some(color) = node.attribute("color") {
        contribution.attrs.color = Some(color.to_string());
    }
    if let Some(size) = node.attribute("size") {
        contribution.attrs.size = Some(size.to_string());
    }
    let bgcolor = node
        .attribute("bgcolor")
        .or_else(|| node.attribute("background"))
        .or_else(|| node.attribute("highlight"));
    if let Some(bg) = bgcolor {
        contribution.attrs.bgcolor = Some(bg.to_string());
    }
    if let Some(family) = node.attribute("name") {
        contribution.attrs.font_family = Some(family.to_string());
    }

    let style = node.attribute("style").unwrap_or("");
    apply_style_word_list(style, &mut contribution.marks, &mut contribution.attrs.fx);

    let words: BTreeSet<String> = style.to_lowercase().replace(',', " ").split_whitespace().map(str::to_string).collect();
    let baseline = node.attribute("baseline").or_else(|| node.attribute("position")).map(str::to_lowercase);
    let is_super = words.contains("superscript") || matches!(baseline.as_deref(), Some("super" | "superscript"));
    let is_sub = words.contains("subscript") || matches!(baseline.as_deref(), Some("sub" | "subscript"));
    if is_super && !is_sub {
        contribution.attrs.script = Some(Script::Super);
        contribution.attrs.fx.insert(Effect::Super);
    } else if is_sub && !is_super {
        contribution.attrs.script = Some(Script::Sub);
        contribution.attrs.fx.insert(Effect::Sub);
    }

    contribution
}

fn apply_style_word_list(style: &str, marks: &mut BTreeSet<StyleMark>, fx: &mut BTreeSet<Effect>) {
    for word in style.to_lowercase().replace(',', " ").split_whitespace() {
        match word {
            "bold" => {
                marks.insert(StyleMark::Bold);
            }
            "italic" => {
                marks.insert(StyleMark::Italic);
            }
            "underline" => {
                marks.insert(StyleMark::Underline);
            }
            "strikethrough" | "strike" | "strikeout" => {
                marks.insert(StyleMark::Strike);
            }
            "shadow" => {
                fx.insert(Effect::Shadow);
            }
            "emboss" => {
                fx.insert(Effect::Emboss);
            }
            "extrude" => {
                fx.insert(Effect::Extrude);
            }
            _ => {}
        }
    }
}

fn mark_only(mark: StyleMark) -> StyleContribution {
    StyleContribution {
        marks: BTreeSet::from([mark]),
        attrs: StyleAttrs::default(),
    }
}

fn script_only(script: Script, effect: Effect) -> StyleContribution {
    StyleContribution {
        marks: BTreeSet::new(),
        attrs: StyleAttrs {
            script: Some(script),
            fx: BTreeSet::from([effect]),
            ..Default::default()
        },
    }
}

fn roxmltree_local_name(node: Node) -> &str {
    node.tag_name().name()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> roxmltree::Document<'_> {
        roxmltree::Document::parse(xml).unwrap()
    }

    #[test]
    fn bold_tag_contributes_bold_mark() {
        let doc = parse(r#"<b xmlns="urn:dxl"/>"#);
        let c = style_from_generic_tag(doc.root_element());
        assert!(c.marks.contains(&StyleMark::Bold));
    }

    #[test]
    fn font_tag_contributes_color_and_family() {
        let doc = parse(r#"<font xmlns="urn:dxl" color="red" name="Arial"/>"#);
        let c = style_from_font(doc.root_element());
        assert_eq!(c.attrs.color.as_deref(), Some("red"));
        assert_eq!(c.attrs.font_family.as_deref(), Some("Arial"));
    }

    #[test]
    fn font_bgcolor_falls_back_to_highlight() {
        let doc = parse(r#"<font xmlns="urn:dxl" highlight="yellow"/>"#);
        let c = style_from_font(doc.root_element());
        assert_eq!(c.attrs.bgcolor.as_deref(), Some("yellow"));
    }

    #[test]
    fn run_highlight_attribute_sets_bgcolor() {
        let doc = parse(r#"<run xmlns="urn:dxl" highlight="yellow"/>"#);
        let c = style_from_generic_tag(doc.root_element());
        assert_eq!(c.attrs.bgcolor.as_deref(), Some("yellow"));
    }

    #[test]
    fn style_word_list_parses_comma_and_space() {
        let doc = parse(r#"<font xmlns="urn:dxl" style="bold,italic underline"/>"#);
        let c = style_from_font(doc.root_element());
        assert!(c.marks.contains(&StyleMark::Bold));
        assert!(c.marks.contains(&StyleMark::Italic));
        assert!(c.marks.contains(&StyleMark::Underline));
    }

    #[test]
    fn strikeout_is_an_alias_for_strike() {
        let doc = parse(r#"<font xmlns="urn:dxl" style="strikeout"/>"#);
        let c = style_from_font(doc.root_element());
        assert!(c.marks.contains(&StyleMark::Strike));
    }

    #[test]
    fn font_style_words_populate_fx() {
        let doc = parse(r#"<font xmlns="urn:dxl" style="shadow,emboss extrude"/>"#);
        let c = style_from_font(doc.root_element());
        assert_eq!(c.attrs.fx, BTreeSet::from([Effect::Shadow, Effect::Emboss, Effect::Extrude]));
    }

    #[test]
    fn font_superscript_style_word_sets_script_and_fx() {
        let doc = parse(r#"<font xmlns="urn:dxl" style="superscript"/>"#);
        let c = style_from_font(doc.root_element());
        assert_eq!(c.attrs.script, Some(Script::Super));
        assert!(c.attrs.fx.contains(&Effect::Super));
    }

    #[test]
    fn font_baseline_sub_attribute_sets_script_and_fx() {
        let doc = parse(r#"<font xmlns="urn:dxl" baseline="sub"/>"#);
        let c = style_from_font(doc.root_element());
        assert_eq!(c.attrs.script, Some(Script::Sub));
        assert!(c.attrs.fx.contains(&Effect::Sub));
    }

    #[test]
    fn sup_tag_sets_script_and_fx() {
        let doc = parse(r#"<sup xmlns="urn:dxl"/>"#);
        let c = style_from_generic_tag(doc.root_element());
        assert_eq!(c.attrs.script, Some(Script::Super));
        assert!(c.attrs.fx.contains(&Effect::Super));
    }

    #[test]
    fn generic_style_attribute_populates_fx_too() {
        let doc = parse(r#"<run xmlns="urn:dxl" style="shadow"/>"#);
        let c = style_from_generic_tag(doc.root_element());
        assert!(c.attrs.fx.contains(&Effect::Shadow));
    }
}
