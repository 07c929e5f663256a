//! Per-render state: current paragraph style, a nested character-style
//! stack, and list state derived from the most recent `par` token.

use dxl_core::ndoc::{ListType, ParAttrs, StyleAttrs, StyleMark};
use std::collections::BTreeSet;

/// One scope's worth of character style, merged the same way the parser
/// merges style-bearing tags: set-union for marks, right-bias overwrite
/// (list-union for `fx`) for attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CharStyle {
    pub marks: BTreeSet<StyleMark>,
    pub attrs: StyleAttrs,
}

impl CharStyle {
    #[must_use]
    pub fn merged_with(&self, other: &CharStyle) -> CharStyle {
        CharStyle {
            marks: self.marks.union(&other.marks).copied().collect(),
            attrs: self.attrs.merged_with(&other.attrs),
        }
    }
}

/// List marker state derived from a paragraph's `list` attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListState {
    pub level: u32,
    pub list_type: Option<ListType>,
}

/// Mutable state a [`crate::visitor::RenderVisitor`] carries across one
/// `render()` call.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub current_par_style: ParAttrs,
    /// Nested character-style scopes; bottom entry is always present.
    /// No renderer currently pushes onto this beyond the bottom scope, but
    /// the stack is kept so a future inline-nesting renderer has somewhere
    /// to push without changing this type's shape.
    char_style_stack: Vec<CharStyle>,
    pub list_state: ListState,
    pub paragraph_started: bool,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self {
            current_par_style: ParAttrs::default(),
            char_style_stack: vec![CharStyle::default()],
            list_state: ListState::default(),
            paragraph_started: false,
        }
    }
}

impl RenderContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates `current_par_style` and re-derives `list_state` from its
    /// `list` attribute.
    pub fn update_par_style(&mut self, par_style: ParAttrs) {
        self.list_state = match &par_style.list {
            Some(list_type) => ListState {
                level: 1,
                list_type: Some(list_type.clone()),
            },
            None => ListState::default(),
        };
        self.current_par_style = par_style;
    }

    pub fn push_char_style(&mut self, style: CharStyle) {
        self.char_style_stack.push(style);
    }

    pub fn pop_char_style(&mut self) {
        if self.char_style_stack.len() > 1 {
            self.char_style_stack.pop();
        } else {
            log::warn!("tried to pop the bottom character style from the stack");
        }
    }

    #[must_use]
    pub fn current_char_style(&self) -> CharStyle {
        let mut merged = CharStyle::default();
        for style in &self.char_style_stack {
            merged = merged.merged_with(style);
        }
        merged
    }
}
