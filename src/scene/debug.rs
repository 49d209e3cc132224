/// Inspector overlay bound to one scene graph.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DebugLayer {
    visible: bool,
    toggles: u32,
}

impl DebugLayer {
    /// `true` while shown.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Show the layer.
    pub fn show(&mut self) {
        self.visible = true;
    }

    /// Hide the layer.
    pub fn hide(&mut self) {
        self.visible = false;
    }

    /// Returns the new visibility.
    pub fn toggle(&mut self) -> bool {
        self.toggles += 1;
        self.visible = !self.visible;
        self.visible
    }

    /// How often the layer was toggled.
    pub fn toggle_count(&self) -> u32 {
        self.toggles
    }
}
