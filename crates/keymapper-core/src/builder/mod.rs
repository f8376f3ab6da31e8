// Keymapper Builders
// Pure editing operations for triggers and key maps

pub mod keymap;
pub mod trigger;
