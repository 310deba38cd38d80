//! Modal dialogs for the application.
//!
//! Each dialog owns a draft of what it edits and hands the result back
//! through [`ModalResult`] once the user confirms or cancels.

pub mod asset_manager;
pub mod personality_editor;
pub mod settings_dialog;

pub use asset_manager::AssetManager;
pub use personality_editor::PersonalityEditor;
pub use settings_dialog::{SettingsAction, SettingsDialog};

use egui::Context;

/// Trait for modal dialogs.
pub trait Modal {
    /// Update and render the modal. Returns true if the modal should close.
    fn update(&mut self, ctx: &Context) -> bool;

    /// Returns true if the modal is currently open.
    fn is_open(&self) -> bool;

    /// Close the modal.
    fn close(&mut self);
}

/// Result from a modal dialog.
#[derive(Debug, Clone)]
pub enum ModalResult<T> {
    /// User hasn't made a decision yet
    Pending,
    /// User confirmed/submitted
    Confirmed(T),
    /// User cancelled
    Cancelled,
}

impl<T> ModalResult<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, ModalResult::Pending)
    }

    pub fn take_value(self) -> Option<T> {
        match self {
            ModalResult::Confirmed(v) => Some(v),
            _ => None,
        }
    }
}

/// Centered, fixed window shared by every dialog
fn dialog_window(title: &str) -> egui::Window<'static> {
    egui::Window::new(title)
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modal_result_values() {
        assert!(ModalResult::<u8>::Pending.is_pending());
        assert_eq!(ModalResult::Confirmed(3).take_value(), Some(3));
        assert_eq!(ModalResult::<u8>::Cancelled.take_value(), None);
    }
}
