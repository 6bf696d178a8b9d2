//! Declarative description of the variant menu and the installer seam.
//!
//! The configurator never touches an avatar's menu system directly: it
//! describes one sub-menu plus one toggle per variant and hands those to a
//! [`MenuInstaller`]. [`RecordingMenuInstaller`] keeps the descriptions as
//! serializable documents, which is what the headless driver writes out.

use crate::assets::BlobHandle;
use crate::materials::MaterialSwitchEntry;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("menu '{0}' already exists")]
    DuplicateMenu(String),
    #[error("no menu '{0}' to remove")]
    UnknownMenu(String),
    #[error("no open menu to add toggle '{0}' to")]
    NoOpenMenu(String),
    #[error("menu '{menu}' already has a toggle with value {value}")]
    DuplicateValue { menu: String, value: u32 },
    #[error("installer rejected the change: {0}")]
    Rejected(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The sub-menu control that groups every variant toggle.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MenuHeader {
    pub name: String,
    pub icon: Option<BlobHandle>,
    /// Selection parameter shared by every toggle in the menu.
    pub parameter: String,
}

/// One material substitution as the menu system stores it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SwitchRecord {
    /// Renderer path below the avatar root.
    pub path: String,
    pub slot: usize,
    pub material: String,
}

impl SwitchRecord {
    /// `base` is the path of the indexed target root below the avatar root.
    pub fn from_entry(entry: &MaterialSwitchEntry, base: &str) -> Self {
        let path = match (base.is_empty(), entry.target_path.is_empty()) {
            (true, _) => entry.target_path.clone(),
            (false, true) => base.to_string(),
            (false, false) => format!("{}/{}", base, entry.target_path),
        };
        Self {
            path,
            slot: entry.slot,
            material: entry.material.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToggleDescription {
    pub name: String,
    pub icon: Option<BlobHandle>,
    pub parameter: String,
    /// Parameter value selecting this toggle. Values start at 1; 0 means
    /// nothing is selected.
    pub value: u32,
    pub is_default: bool,
    pub synced: bool,
    pub saved: bool,
    /// Applied in order when the toggle is active.
    pub switches: Vec<SwitchRecord>,
}

impl ToggleDescription {
    pub fn new(name: &str, parameter: &str, value: u32, switches: Vec<SwitchRecord>) -> Self {
        Self {
            name: name.to_string(),
            icon: None,
            parameter: parameter.to_string(),
            value,
            is_default: false,
            synced: true,
            saved: true,
            switches,
        }
    }

    pub fn with_icon(mut self, icon: Option<BlobHandle>) -> Self {
        self.icon = icon;
        self
    }
}

pub trait MenuInstaller {
    fn contains_menu(&self, name: &str) -> bool;

    fn remove_menu(&mut self, name: &str) -> Result<(), InstallError>;

    /// Open a new sub-menu. Toggles added afterwards belong to it.
    fn begin_menu(&mut self, header: MenuHeader) -> Result<(), InstallError>;

    fn add_toggle(&mut self, toggle: ToggleDescription) -> Result<(), InstallError>;
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MenuDocument {
    #[serde(flatten)]
    pub header: MenuHeader,
    pub toggles: Vec<ToggleDescription>,
}

#[derive(Debug, Default)]
pub struct RecordingMenuInstaller {
    menus: Vec<MenuDocument>,
    open: Option<usize>,
}

impl RecordingMenuInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn menus(&self) -> &[MenuDocument] {
        &self.menus
    }

    pub fn menu(&self, name: &str) -> Option<&MenuDocument> {
        self.menus.iter().find(|menu| menu.header.name == name)
    }

    pub fn to_json(&self) -> Result<String, InstallError> {
        Ok(serde_json::to_string_pretty(&self.menus)?)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), InstallError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

impl MenuInstaller for RecordingMenuInstaller {
    fn contains_menu(&self, name: &str) -> bool {
        self.menu(name).is_some()
    }

    fn remove_menu(&mut self, name: &str) -> Result<(), InstallError> {
        let position = self
            .menus
            .iter()
            .position(|menu| menu.header.name == name)
            .ok_or_else(|| InstallError::UnknownMenu(name.to_string()))?;
        self.menus.remove(position);
        self.open = None;
        Ok(())
    }

    fn begin_menu(&mut self, header: MenuHeader) -> Result<(), InstallError> {
        if self.contains_menu(&header.name) {
            return Err(InstallError::DuplicateMenu(header.name));
        }
        self.menus.push(MenuDocument {
            header,
            toggles: Vec::new(),
        });
        self.open = Some(self.menus.len() - 1);
        Ok(())
    }

    fn add_toggle(&mut self, toggle: ToggleDescription) -> Result<(), InstallError> {
        let Some(menu) = self.open.and_then(|index| self.menus.get_mut(index)) else {
            return Err(InstallError::NoOpenMenu(toggle.name));
        };
        if menu.toggles.iter().any(|existing| existing.value == toggle.value) {
            return Err(InstallError::DuplicateValue {
                menu: menu.header.name.clone(),
                value: toggle.value,
            });
        }
        menu.toggles.push(toggle);
        Ok(())
    }
}
