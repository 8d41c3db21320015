//! Branching choices shown over a dialog.
//!
//! Guards are evaluated once, when the choices are presented, against the
//! current [`DialogSaveSystem`]. Guards must be pure and must not panic.

use super::entry::DialogEntry;
use super::save::DialogSaveSystem;
use std::rc::Rc;
use thiserror::Error;

/// Side effect run when a choice is picked.
pub type ChoiceAction = Rc<dyn Fn()>;

/// Availability predicate for a choice.
pub type ChoiceGuard = Rc<dyn Fn(&DialogSaveSystem) -> bool>;

/// Callback receiving the original index of the picked choice.
pub type SelectionCallback = Box<dyn FnOnce(usize)>;

/// Errors from choice selection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChoiceError {
    #[error("Choice {0} is not currently presented")]
    NotPresented(usize),
}

/// One selectable option.
#[derive(Clone)]
pub struct Choice {
    pub text: String,
    /// Lines played after the choice is picked.
    pub consequence: Vec<DialogEntry>,
    action: Option<ChoiceAction>,
    guard: Option<ChoiceGuard>,
}

impl Choice {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            consequence: Vec::new(),
            action: None,
            guard: None,
        }
    }

    /// Lines to play when picked.
    pub fn with_consequence(mut self, entries: Vec<DialogEntry>) -> Self {
        self.consequence = entries;
        self
    }

    /// Side effect to run when picked.
    pub fn with_action(mut self, action: impl Fn() + 'static) -> Self {
        self.action = Some(Rc::new(action));
        self
    }

    /// Only offer the choice while `guard` holds.
    pub fn with_guard(mut self, guard: impl Fn(&DialogSaveSystem) -> bool + 'static) -> Self {
        self.guard = Some(Rc::new(guard));
        self
    }

    pub fn is_available(&self, save: &DialogSaveSystem) -> bool {
        self.guard.as_ref().map_or(true, |guard| guard(save))
    }
}

impl std::fmt::Debug for Choice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Choice")
            .field("text", &self.text)
            .field("consequence", &self.consequence.len())
            .field("has_action", &self.action.is_some())
            .field("has_guard", &self.guard.is_some())
            .finish()
    }
}

/// A choice as shown to the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedChoice {
    /// Position in the list passed to [`ChoiceOverlay::present`].
    pub index: usize,
    pub text: String,
}

/// Rendering surface for the choice list.
pub trait ChoiceView {
    fn show_choices(&mut self, choices: &[PresentedChoice]);
    fn hide_choices(&mut self);
}

/// Result of picking a choice.
///
/// The caller plays `consequence` and then calls [`Selection::complete`].
pub struct Selection {
    pub index: usize,
    pub consequence: Vec<DialogEntry>,
    on_selected: Option<SelectionCallback>,
}

impl Selection {
    /// Report the pick to whoever presented the choices.
    pub fn complete(mut self) {
        if let Some(callback) = self.on_selected.take() {
            callback(self.index);
        }
    }

    /// Split off the callback so it can run later.
    pub fn into_parts(self) -> (usize, Vec<DialogEntry>, Option<SelectionCallback>) {
        (self.index, self.consequence, self.on_selected)
    }
}

/// The choice list overlay.
#[derive(Default)]
pub struct ChoiceOverlay {
    view: Option<Box<dyn ChoiceView>>,
    choices: Vec<Choice>,
    presented: Vec<PresentedChoice>,
    on_selected: Option<SelectionCallback>,
    visible: bool,
}

impl ChoiceOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_view(mut self, view: Box<dyn ChoiceView>) -> Self {
        self.view = Some(view);
        self
    }

    pub fn set_view(&mut self, view: Option<Box<dyn ChoiceView>>) {
        self.view = view;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Choices currently offered, in display order.
    pub fn presented(&self) -> &[PresentedChoice] {
        &self.presented
    }

    /// Offer the choices whose guards pass. Returns how many are shown.
    ///
    /// Nothing is shown when every guard fails.
    pub fn present(
        &mut self,
        choices: Vec<Choice>,
        save: &DialogSaveSystem,
        on_selected: SelectionCallback,
    ) -> usize {
        self.hide();

        let presented: Vec<PresentedChoice> = choices
            .iter()
            .enumerate()
            .filter(|(_, choice)| choice.is_available(save))
            .map(|(index, choice)| PresentedChoice {
                index,
                text: choice.text.clone(),
            })
            .collect();

        if presented.is_empty() {
            tracing::warn!("No available choices out of {}", choices.len());
            return 0;
        }

        match self.view.as_mut() {
            Some(view) => view.show_choices(&presented),
            None => tracing::warn!("No choice view attached; choices not rendered"),
        }

        let count = presented.len();
        self.choices = choices;
        self.presented = presented;
        self.on_selected = Some(on_selected);
        self.visible = true;
        count
    }

    /// Pick the choice with original index `index`.
    ///
    /// Hides the overlay and runs the choice's action. Fails unless the
    /// overlay is on screen and `index` is one of the presented choices.
    pub fn select(&mut self, index: usize) -> Result<Selection, ChoiceError> {
        if !self.visible || !self.presented.iter().any(|p| p.index == index) {
            return Err(ChoiceError::NotPresented(index));
        }

        let mut choices = std::mem::take(&mut self.choices);
        let on_selected = self.on_selected.take();
        self.hide();
        let choice = choices.swap_remove(index);

        if let Some(action) = &choice.action {
            action();
        }

        Ok(Selection {
            index,
            consequence: choice.consequence,
            on_selected,
        })
    }

    /// Close the overlay and drop the pending choices without selecting.
    /// Safe to call when already hidden.
    pub fn hide(&mut self) {
        self.clear();
        if !self.visible {
            return;
        }
        self.visible = false;
        if let Some(view) = self.view.as_mut() {
            view.hide_choices();
        }
    }

    fn clear(&mut self) {
        self.choices.clear();
        self.presented.clear();
        self.on_selected = None;
    }
}

impl std::fmt::Debug for ChoiceOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChoiceOverlay")
            .field("presented", &self.presented)
            .field("visible", &self.visible)
            .finish()
    }
}
