//! Menu actions and separators contributed by participants.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use synthclone_core::{EffectId, SamplerId, TargetId};

use crate::component::ComponentId;

/// Top-level menus participants can extend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum Menu {
    #[strum(to_string = "Add Effect")]
    AddEffect,
    #[strum(to_string = "Add Sampler")]
    AddSampler,
    #[strum(to_string = "Add Target")]
    AddTarget,
    Help,
    Tools,
}

/// Where a menu item lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuLocation {
    /// A top-level menu.
    Menu(Menu),
    /// The context menu of an effect.
    Effect(EffectId),
    /// The context menu of the sampler.
    Sampler(SamplerId),
    /// The context menu of a target.
    Target(TargetId),
}

impl MenuLocation {
    /// Component the item is scoped to, if any.
    pub fn component(self) -> Option<ComponentId> {
        match self {
            Self::Menu(_) => None,
            Self::Effect(id) => Some(ComponentId::Effect(id)),
            Self::Sampler(id) => Some(ComponentId::Sampler(id)),
            Self::Target(id) => Some(ComponentId::Target(id)),
        }
    }
}

impl From<Menu> for MenuLocation {
    fn from(menu: Menu) -> Self {
        Self::Menu(menu)
    }
}

/// A clickable menu entry.
pub struct MenuAction {
    text: RefCell<String>,
    description: RefCell<String>,
    enabled: Cell<bool>,
    triggered: RefCell<Vec<Rc<dyn Fn()>>>,
}

impl fmt::Debug for MenuAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuAction")
            .field("text", &*self.text.borrow())
            .field("enabled", &self.enabled.get())
            .finish_non_exhaustive()
    }
}

impl MenuAction {
    pub fn new(text: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            text: RefCell::new(text.into()),
            description: RefCell::new(String::new()),
            enabled: Cell::new(true),
            triggered: RefCell::new(Vec::new()),
        })
    }

    pub fn text(&self) -> String {
        self.text.borrow().clone()
    }

    pub fn set_text(&self, text: impl Into<String>) {
        *self.text.borrow_mut() = text.into();
    }

    pub fn description(&self) -> String {
        self.description.borrow().clone()
    }

    pub fn set_description(&self, description: impl Into<String>) {
        *self.description.borrow_mut() = description.into();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    /// Run `handler` whenever the action is triggered.
    pub fn on_triggered(&self, handler: impl Fn() + 'static) {
        self.triggered.borrow_mut().push(Rc::new(handler));
    }

    /// Trigger the action. Disabled actions do nothing.
    pub fn trigger(&self) {
        if !self.enabled.get() {
            return;
        }
        let handlers: Vec<_> = self.triggered.borrow().iter().cloned().collect();
        for handler in handlers {
            handler();
        }
    }
}

/// A separator line between menu actions.
#[derive(Debug)]
pub struct MenuSeparator {
    visible: Cell<bool>,
}

impl MenuSeparator {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            visible: Cell::new(true),
        })
    }

    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.set(visible);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_respects_enabled() {
        let action = MenuAction::new("Generate Zones");
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        action.on_triggered(move || h.set(h.get() + 1));

        action.trigger();
        action.set_enabled(false);
        action.trigger();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_location_scope() {
        assert_eq!(MenuLocation::from(Menu::Tools).component(), None);
        assert_eq!(
            MenuLocation::Effect(EffectId::new(2)).component(),
            Some(ComponentId::Effect(EffectId::new(2)))
        );
        assert_eq!(Menu::AddEffect.to_string(), "Add Effect");
    }
}
