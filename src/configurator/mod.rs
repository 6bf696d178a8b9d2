//! Turns a set of donor outfits into one avatar menu.
//!
//! Each variant is matched against the avatar's target object, reduced to
//! a material switch list and installed as a toggle. Variants that ask for
//! it also get a thumbnail: the switch list is applied to a copy of the
//! avatar, which is rendered in an isolated preview session and stored
//! through a [`BlobStore`]. The avatar in the request is never modified.

mod validate;

pub use validate::{validate, validate_preview, ValidationIssue};

use crate::assets::{BlobHandle, BlobStore, BlobStoreError};
use crate::correspondence::{resolve, HierarchyIndex, IndexError};
use crate::materials::{apply_switches, build_switch_list, MaterialSwitchEntry, SwitchList};
use crate::menu::{InstallError, MenuHeader, MenuInstaller, SwitchRecord, ToggleDescription};
use crate::render::{
    resolve_reference, PreviewError, PreviewRenderSession, RenderBackend, SubjectReference,
};
use crate::scene::{Hierarchy, NodeId};
use crate::settings::ConfiguratorSettings;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct VariantSpec {
    pub name: String,
    /// Object whose materials the variant takes over. Its root is the
    /// counterpart of the request's target object.
    pub donor: Option<Hierarchy>,
    /// Already assigned icon; suppresses preview generation.
    pub icon: Option<BlobHandle>,
    pub auto_preview: bool,
}

#[derive(Debug, Clone)]
pub struct MenuRequest {
    pub avatar: Option<Hierarchy>,
    /// Path of the worn object below the avatar root.
    pub target_path: String,
    pub menu_name: String,
    pub menu_icon: Option<BlobHandle>,
    pub variants: Vec<VariantSpec>,
}

/// Shared flag checked between variants.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PreviewFailure {
    #[error(transparent)]
    Render(#[from] PreviewError),
    #[error(transparent)]
    Store(#[from] BlobStoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum BatchWarning {
    #[error("{variant}: no renderer matches '{donor_path}'")]
    Unresolved { variant: String, donor_path: String },
    #[error("{variant}: '{target_path}' lacks {skipped} of the material slots of '{donor_path}'")]
    SlotDiscrepancy {
        variant: String,
        donor_path: String,
        target_path: String,
        skipped: usize,
    },
    #[error("{variant}: preview failed: {error}")]
    PreviewFailed {
        variant: String,
        #[source]
        error: PreviewFailure,
    },
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub variants_created: usize,
    pub switch_entries: usize,
    pub unresolved_nodes: usize,
    pub slot_discrepancies: usize,
    pub previews_generated: usize,
    pub warnings: Vec<BatchWarning>,
    pub cancelled: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigureError {
    #[error("request has {} validation issue(s)", .0.len())]
    Validation(Vec<ValidationIssue>),
    #[error("menu '{0}' already exists")]
    MenuAlreadyExists(String),
    #[error("no variant at index {0}")]
    UnknownVariant(usize),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("preview for '{variant}' failed: {source}")]
    Preview {
        variant: String,
        #[source]
        source: PreviewFailure,
    },
    /// The batch stopped part way. Variants already in `report` stay
    /// installed.
    #[error("batch aborted after {} variant(s): {source}", .report.variants_created)]
    Fatal {
        #[source]
        source: BatchAbort,
        report: Box<BatchReport>,
    },
}

/// Why a batch stopped after the menu was begun.
#[derive(Debug, thiserror::Error)]
pub enum BatchAbort {
    #[error(transparent)]
    Install(#[from] InstallError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Everything the configurator derives from a validated request.
struct Prepared<'r> {
    avatar: &'r Hierarchy,
    target: NodeId,
    target_path: &'r str,
}

impl<'r> Prepared<'r> {
    fn new(request: &'r MenuRequest, issues: Vec<ValidationIssue>) -> Result<Self, ConfigureError> {
        if !issues.is_empty() {
            return Err(ConfigureError::Validation(issues));
        }
        let (Some(avatar), Some(target)) = (request.avatar.as_ref(), validate::target_node(request))
        else {
            return Err(ConfigureError::Validation(vec![ValidationIssue::MissingTarget]));
        };
        Ok(Self {
            avatar,
            target,
            target_path: request.target_path.trim_matches('/'),
        })
    }

    /// Donor paths with no counterpart, plus the switch list for the rest.
    fn switches(&self, donor: &Hierarchy) -> Result<(Vec<String>, SwitchList), IndexError> {
        let target = HierarchyIndex::build(self.avatar, self.target)?;
        let donor = HierarchyIndex::build(donor, donor.root())?;
        let correspondence = resolve(&donor, &target);
        let switches = build_switch_list(&correspondence, &donor, &target);
        Ok((correspondence.unresolved, switches))
    }
}

pub struct VariantConfigurator {
    settings: ConfiguratorSettings,
}

impl VariantConfigurator {
    pub fn new(settings: ConfiguratorSettings) -> Self {
        Self {
            settings: settings.normalized(),
        }
    }

    pub fn settings(&self) -> &ConfiguratorSettings {
        &self.settings
    }

    /// Validate, then install one toggle per variant in declaration order.
    ///
    /// Nothing is installed or stored when validation fails.
    pub fn execute<I, S, B>(
        &self,
        request: &MenuRequest,
        installer: &mut I,
        store: &mut S,
        backend: &mut B,
        cancel: &CancelToken,
    ) -> Result<BatchReport, ConfigureError>
    where
        I: MenuInstaller + ?Sized,
        S: BlobStore + ?Sized,
        B: RenderBackend,
    {
        let prepared = Prepared::new(request, validate(request))?;
        let menu_name = request.menu_name.trim();

        if installer.contains_menu(menu_name) {
            if !self.settings.replace_existing_menu {
                return Err(ConfigureError::MenuAlreadyExists(menu_name.to_string()));
            }
            log::info!("Replacing existing menu '{}'", menu_name);
            installer
                .remove_menu(menu_name)
                .map_err(|source| fatal(source, BatchReport::default()))?;
        }
        installer
            .begin_menu(MenuHeader {
                name: menu_name.to_string(),
                icon: request.menu_icon.clone(),
                parameter: self.settings.parameter_name.clone(),
            })
            .map_err(|source| fatal(source, BatchReport::default()))?;

        let report =
            self.install_variants(&prepared, &request.variants, installer, store, backend, cancel)?;
        log::info!(
            "Menu '{}': {} variants, {} switches, {} previews, {} warnings",
            menu_name,
            report.variants_created,
            report.switch_entries,
            report.previews_generated,
            report.warnings.len()
        );
        Ok(report)
    }

    /// Resolve, preview and install each variant into the open menu.
    fn install_variants<I, S, B>(
        &self,
        prepared: &Prepared<'_>,
        variants: &[VariantSpec],
        installer: &mut I,
        store: &mut S,
        backend: &mut B,
        cancel: &CancelToken,
    ) -> Result<BatchReport, ConfigureError>
    where
        I: MenuInstaller + ?Sized,
        S: BlobStore + ?Sized,
        B: RenderBackend,
    {
        let mut report = BatchReport::default();
        for (index, variant) in variants.iter().enumerate() {
            if cancel.is_cancelled() {
                log::warn!("Cancelled after {} of {} variants", index, variants.len());
                report.cancelled = true;
                break;
            }
            let Some(donor) = variant.donor.as_ref() else {
                continue;
            };

            let (unresolved, switches) = match prepared.switches(donor) {
                Ok(resolved) => resolved,
                Err(source) => {
                    log::error!("Indexing '{}' failed: {}", variant.name, source);
                    return Err(fatal(source, report));
                }
            };
            record_resolution(&mut report, &variant.name, unresolved, &switches);

            let icon = if variant.icon.is_some() {
                variant.icon.clone()
            } else if variant.auto_preview {
                match self.preview(prepared, &variant.name, &switches.entries, store, backend) {
                    Ok(handle) => {
                        report.previews_generated += 1;
                        Some(handle)
                    }
                    Err(error) => {
                        log::warn!("Preview for '{}' failed: {}", variant.name, error);
                        report.warnings.push(BatchWarning::PreviewFailed {
                            variant: variant.name.clone(),
                            error,
                        });
                        None
                    }
                }
            } else {
                None
            };

            let records = switches
                .entries
                .iter()
                .map(|entry| SwitchRecord::from_entry(entry, prepared.target_path))
                .collect();
            let toggle = ToggleDescription::new(
                variant.name.trim(),
                &self.settings.parameter_name,
                index as u32 + 1,
                records,
            )
            .with_icon(icon);
            if let Err(source) = installer.add_toggle(toggle) {
                log::error!("Installing '{}' failed: {}", variant.name, source);
                return Err(fatal(source, report));
            }

            report.variants_created += 1;
            report.switch_entries += switches.summary.entries;
            log::info!(
                "Created variant '{}' with {} material switches",
                variant.name,
                switches.summary.entries
            );
        }
        Ok(report)
    }

    /// Render and store the thumbnail of one variant without touching any
    /// menu.
    pub fn generate_preview<S, B>(
        &self,
        request: &MenuRequest,
        index: usize,
        store: &mut S,
        backend: &mut B,
    ) -> Result<BlobHandle, ConfigureError>
    where
        S: BlobStore + ?Sized,
        B: RenderBackend,
    {
        let variant = request
            .variants
            .get(index)
            .ok_or(ConfigureError::UnknownVariant(index))?;
        let prepared = Prepared::new(request, validate_preview(request, index))?;
        let Some(donor) = variant.donor.as_ref() else {
            return Err(ConfigureError::Validation(vec![ValidationIssue::MissingDonor {
                variant: variant.name.clone(),
            }]));
        };
        let (_, switches) = prepared.switches(donor)?;
        self.preview(&prepared, &variant.name, &switches.entries, store, backend)
            .map_err(|source| ConfigureError::Preview {
                variant: variant.name.clone(),
                source,
            })
    }

    /// Thumbnails for every variant, in declaration order. One failure
    /// does not stop the others.
    pub fn generate_all_previews<S, B>(
        &self,
        request: &MenuRequest,
        store: &mut S,
        backend: &mut B,
    ) -> Vec<Result<BlobHandle, ConfigureError>>
    where
        S: BlobStore + ?Sized,
        B: RenderBackend,
    {
        (0..request.variants.len())
            .map(|index| {
                let result = self.generate_preview(request, index, store, backend);
                if let Err(error) = &result {
                    log::warn!("Preview {} failed: {}", index, error);
                }
                result
            })
            .collect()
    }

    fn preview<S, B>(
        &self,
        prepared: &Prepared<'_>,
        variant: &str,
        entries: &[MaterialSwitchEntry],
        store: &mut S,
        backend: &mut B,
    ) -> Result<BlobHandle, PreviewFailure>
    where
        S: BlobStore + ?Sized,
        B: RenderBackend,
    {
        let mut scene = prepared.avatar.clone();
        apply_switches(&mut scene, entries);

        let reference = match resolve_reference(&scene) {
            Ok(reference) => reference,
            Err(PreviewError::NoReferencePoint) => {
                log::warn!(
                    "No view height on the avatar; framing '{}' at {}",
                    variant,
                    self.settings.preview.fallback_height
                );
                SubjectReference::fallback(self.settings.preview.fallback_height)
            }
            Err(error) => return Err(error.into()),
        };

        let root = scene.root();
        let image = {
            let mut session = PreviewRenderSession::open(
                &mut scene,
                root,
                reference,
                &self.settings.preview,
                backend,
            )?;
            session.capture()?
        };

        let name = format!("{}{}", self.settings.preview_name_prefix, variant.trim());
        Ok(store.store(&image, &name)?)
    }
}

fn fatal(source: impl Into<BatchAbort>, report: BatchReport) -> ConfigureError {
    ConfigureError::Fatal {
        source: source.into(),
        report: Box::new(report),
    }
}

fn record_resolution(
    report: &mut BatchReport,
    variant: &str,
    unresolved: Vec<String>,
    switches: &SwitchList,
) {
    report.unresolved_nodes += unresolved.len();
    report
        .warnings
        .extend(unresolved.into_iter().map(|donor_path| BatchWarning::Unresolved {
            variant: variant.to_string(),
            donor_path,
        }));
    for discrepancy in &switches.summary.discrepancies {
        report.warnings.push(BatchWarning::SlotDiscrepancy {
            variant: variant.to_string(),
            donor_path: discrepancy.donor_path.clone(),
            target_path: discrepancy.target_path.clone(),
            skipped: discrepancy.skipped,
        });
    }
    report.slot_discrepancies += switches.summary.slot_discrepancies;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryBlobStore;
    use crate::menu::RecordingMenuInstaller;
    use crate::render::{
        FrameStats, PreviewCamera, RenderError, RenderTargetHandle, SoftwareRenderer,
    };
    use crate::scene::{AvatarDescriptor, Material, Mesh, Renderable};
    use crate::settings::PreviewSettings;
    use image::RgbaImage;

    const RED: [u8; 4] = [255, 0, 0, 255];

    fn cuboid(min: [f32; 3], max: [f32; 3], slots: usize) -> Arc<Mesh> {
        Arc::new(Mesh::cuboid(min, max, slots))
    }

    /// Avatar with a body and an outfit of shirt (two slots) and pants.
    fn avatar() -> Hierarchy {
        let mut tree = Hierarchy::new("Avatar");
        let root = tree.root();
        let skin = Material::shared("Skin", [0.9, 0.7, 0.6, 1.0]);
        let cloth = Material::shared("Cloth", [0.5, 0.5, 0.5, 1.0]);
        tree.add_renderable(
            root,
            "Body",
            Renderable::new(vec![Some(skin)])
                .with_mesh(cuboid([-0.2, 0.0, -0.1], [0.2, 1.6, 0.1], 1)),
        );
        let outfit = tree.add_child(root, "Outfit");
        tree.add_renderable(
            outfit,
            "Shirt",
            Renderable::new(vec![Some(cloth.clone()), Some(cloth.clone())])
                .with_mesh(cuboid([-0.3, 0.9, -0.15], [0.3, 1.3, 0.15], 2)),
        );
        tree.add_renderable(
            outfit,
            "Pants",
            Renderable::new(vec![Some(cloth)])
                .with_mesh(cuboid([-0.25, 0.2, -0.15], [0.25, 0.9, 0.15], 1)),
        );
        tree.set_descriptor(Some(AvatarDescriptor {
            view_position: [0.0, 1.4, 0.0],
            head: None,
        }));
        tree
    }

    /// Donor outfit painted entirely in one material.
    fn donor(name: &str, rgba: [f32; 4], extra: &[&str]) -> Hierarchy {
        let material = Material::shared(name, rgba);
        let mut tree = Hierarchy::new("Outfit");
        let root = tree.root();
        tree.add_renderable(
            root,
            "Shirt",
            Renderable::new(vec![Some(material.clone()), Some(material.clone())]),
        );
        tree.add_renderable(root, "Pants", Renderable::new(vec![Some(material.clone())]));
        for name in extra {
            tree.add_renderable(root, name, Renderable::new(vec![Some(material.clone())]));
        }
        tree
    }

    fn variant(name: &str, donor: Hierarchy) -> VariantSpec {
        VariantSpec {
            name: name.to_string(),
            donor: Some(donor),
            icon: None,
            auto_preview: true,
        }
    }

    fn request(variants: Vec<VariantSpec>) -> MenuRequest {
        MenuRequest {
            avatar: Some(avatar()),
            target_path: "Outfit".to_string(),
            menu_name: "Colors".to_string(),
            menu_icon: None,
            variants,
        }
    }

    fn configurator() -> VariantConfigurator {
        VariantConfigurator::new(ConfiguratorSettings {
            preview: PreviewSettings {
                image_size: 48,
                ..PreviewSettings::default()
            },
            ..ConfiguratorSettings::default()
        })
    }

    fn shirt_materials(request: &MenuRequest) -> Vec<String> {
        let avatar = request.avatar.as_ref().unwrap();
        let shirt = avatar.find_path(avatar.root(), "Outfit/Shirt").unwrap();
        avatar
            .renderable(shirt)
            .unwrap()
            .slots()
            .iter()
            .map(|slot| slot.as_ref().unwrap().name.clone())
            .collect()
    }

    #[test]
    fn installs_one_toggle_per_variant() {
        let request = request(vec![
            variant("Red", donor("Red", [1.0, 0.0, 0.0, 1.0], &["Hat"])),
            variant("Blue", donor("Blue", [0.0, 0.0, 1.0, 1.0], &[])),
        ]);
        let mut installer = RecordingMenuInstaller::new();
        let mut store = MemoryBlobStore::new();
        let mut renderer = SoftwareRenderer::new();

        let report = configurator()
            .execute(
                &request,
                &mut installer,
                &mut store,
                &mut renderer,
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(report.variants_created, 2);
        assert_eq!(report.switch_entries, 6);
        assert_eq!(report.unresolved_nodes, 1);
        assert_eq!(report.previews_generated, 2);
        assert!(!report.cancelled);
        assert!(matches!(
            &report.warnings[..],
            [BatchWarning::Unresolved { donor_path, .. }] if donor_path == "Hat"
        ));

        let menu = installer.menu("Colors").unwrap();
        assert_eq!(menu.header.parameter, "ColorSelect");
        let values: Vec<u32> = menu.toggles.iter().map(|toggle| toggle.value).collect();
        assert_eq!(values, vec![1, 2]);
        let red = &menu.toggles[0];
        assert_eq!(red.icon.as_ref().unwrap().name, "Preview_Red");
        assert_eq!(red.switches[0].path, "Outfit/Shirt");
        assert_eq!(red.switches[2].path, "Outfit/Pants");
        assert!(red.switches.iter().all(|switch| switch.material == "Red"));

        let thumbnail = store.get("Preview_Red").unwrap();
        assert!(thumbnail.pixels().any(|pixel| pixel.0 == RED));
        let blue = store.get("Preview_Blue").unwrap();
        assert!(!blue.pixels().any(|pixel| pixel.0 == RED));

        assert_eq!(renderer.live_targets(), 0);
        assert_eq!(shirt_materials(&request), vec!["Cloth", "Cloth"]);
    }

    #[test]
    fn duplicate_names_reject_the_whole_batch() {
        let request = request(vec![
            variant("Red", donor("Red", [1.0, 0.0, 0.0, 1.0], &[])),
            variant("Red", donor("Red", [0.8, 0.0, 0.0, 1.0], &[])),
        ]);
        let mut installer = RecordingMenuInstaller::new();
        let mut store = MemoryBlobStore::new();
        let mut renderer = SoftwareRenderer::new();

        let error = configurator()
            .execute(
                &request,
                &mut installer,
                &mut store,
                &mut renderer,
                &CancelToken::new(),
            )
            .unwrap_err();

        match error {
            ConfigureError::Validation(issues) => assert_eq!(
                issues,
                vec![ValidationIssue::DuplicateVariantName("Red".to_string())]
            ),
            other => panic!("unexpected error: {other}"),
        }
        assert!(installer.menus().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn existing_icon_skips_preview() {
        let mut spec = variant("Red", donor("Red", [1.0, 0.0, 0.0, 1.0], &[]));
        let icon = BlobHandle {
            name: "Hand_Painted".to_string(),
            digest: "00".to_string(),
        };
        spec.icon = Some(icon.clone());
        let mut plain = variant("Plain", donor("Plain", [1.0; 4], &[]));
        plain.auto_preview = false;
        let request = request(vec![spec, plain]);
        let mut installer = RecordingMenuInstaller::new();
        let mut store = MemoryBlobStore::new();

        let report = configurator()
            .execute(
                &request,
                &mut installer,
                &mut store,
                &mut SoftwareRenderer::new(),
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(report.previews_generated, 0);
        assert!(store.is_empty());
        let menu = installer.menu("Colors").unwrap();
        assert_eq!(menu.toggles[0].icon, Some(icon));
        assert_eq!(menu.toggles[1].icon, None);
    }

    /// Backend with no render targets at all.
    struct Headless;

    impl RenderBackend for Headless {
        fn create_render_target(
            &mut self,
            _width: u32,
            _height: u32,
        ) -> Result<RenderTargetHandle, RenderError> {
            Err(RenderError::Unavailable("headless".to_string()))
        }

        fn render(
            &mut self,
            _scene: &Hierarchy,
            _camera: &PreviewCamera,
            target: RenderTargetHandle,
        ) -> Result<FrameStats, RenderError> {
            Err(RenderError::UnknownTarget(target))
        }

        fn read_pixels(&mut self, target: RenderTargetHandle) -> Result<RgbaImage, RenderError> {
            Err(RenderError::UnknownTarget(target))
        }

        fn destroy_render_target(&mut self, _target: RenderTargetHandle) {}
    }

    #[test]
    fn preview_failure_keeps_the_variant() {
        let request = request(vec![
            variant("Red", donor("Red", [1.0, 0.0, 0.0, 1.0], &[])),
            variant("Blue", donor("Blue", [0.0, 0.0, 1.0, 1.0], &[])),
        ]);
        let mut installer = RecordingMenuInstaller::new();
        let mut store = MemoryBlobStore::new();

        let report = configurator()
            .execute(
                &request,
                &mut installer,
                &mut store,
                &mut Headless,
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(report.variants_created, 2);
        assert_eq!(report.previews_generated, 0);
        assert_eq!(report.warnings.len(), 2);
        assert!(report.warnings.iter().all(|warning| matches!(
            warning,
            BatchWarning::PreviewFailed {
                error: PreviewFailure::Render(PreviewError::Render(_)),
                ..
            }
        )));
        let menu = installer.menu("Colors").unwrap();
        assert!(menu.toggles.iter().all(|toggle| toggle.icon.is_none()));
    }

    /// Installer that refuses the second toggle.
    struct RefuseSecond {
        inner: RecordingMenuInstaller,
        toggles: usize,
    }

    impl MenuInstaller for RefuseSecond {
        fn contains_menu(&self, name: &str) -> bool {
            self.inner.contains_menu(name)
        }

        fn remove_menu(&mut self, name: &str) -> Result<(), InstallError> {
            self.inner.remove_menu(name)
        }

        fn begin_menu(&mut self, header: MenuHeader) -> Result<(), InstallError> {
            self.inner.begin_menu(header)
        }

        fn add_toggle(&mut self, toggle: ToggleDescription) -> Result<(), InstallError> {
            self.toggles += 1;
            if self.toggles == 2 {
                return Err(InstallError::Rejected("parameter budget exceeded".to_string()));
            }
            self.inner.add_toggle(toggle)
        }
    }

    #[test]
    fn installer_failure_is_fatal_but_keeps_completed_variants() {
        let mut request = request(vec![
            variant("Red", donor("Red", [1.0, 0.0, 0.0, 1.0], &[])),
            variant("Blue", donor("Blue", [0.0, 0.0, 1.0, 1.0], &[])),
            variant("Green", donor("Green", [0.0, 1.0, 0.0, 1.0], &[])),
        ]);
        for spec in &mut request.variants {
            spec.auto_preview = false;
        }
        let mut installer = RefuseSecond {
            inner: RecordingMenuInstaller::new(),
            toggles: 0,
        };

        let error = configurator()
            .execute(
                &request,
                &mut installer,
                &mut MemoryBlobStore::new(),
                &mut SoftwareRenderer::new(),
                &CancelToken::new(),
            )
            .unwrap_err();

        let ConfigureError::Fatal { source, report } = error else {
            panic!("expected a fatal error");
        };
        assert!(matches!(source, BatchAbort::Install(InstallError::Rejected(_))));
        assert_eq!(report.variants_created, 1);
        assert_eq!(installer.toggles, 2);
        let names: Vec<&str> = installer
            .inner
            .menu("Colors")
            .unwrap()
            .toggles
            .iter()
            .map(|toggle| toggle.name.as_str())
            .collect();
        assert_eq!(names, vec!["Red"]);
    }

    #[test]
    fn index_failure_mid_batch_keeps_completed_variants() {
        let avatar = avatar();
        let prepared = Prepared {
            avatar: &avatar,
            target: avatar.find_path(avatar.root(), "Outfit").unwrap(),
            target_path: "Outfit",
        };
        let mut red = variant("Red", donor("Red", [1.0, 0.0, 0.0, 1.0], &[]));
        red.auto_preview = false;
        let mut bare = variant("Bare", Hierarchy::new("Outfit"));
        bare.auto_preview = false;
        let mut installer = RecordingMenuInstaller::new();
        installer
            .begin_menu(MenuHeader {
                name: "Colors".to_string(),
                icon: None,
                parameter: "ColorSelect".to_string(),
            })
            .unwrap();

        let error = configurator()
            .install_variants(
                &prepared,
                &[red, bare],
                &mut installer,
                &mut MemoryBlobStore::new(),
                &mut SoftwareRenderer::new(),
                &CancelToken::new(),
            )
            .unwrap_err();

        let ConfigureError::Fatal { source, report } = error else {
            panic!("expected a fatal error");
        };
        assert!(matches!(source, BatchAbort::Index(IndexError::EmptyHierarchy { .. })));
        assert_eq!(report.variants_created, 1);
        assert_eq!(installer.menu("Colors").unwrap().toggles.len(), 1);
    }

    /// Cancels the batch as soon as the first toggle lands.
    struct CancelAfterFirst {
        inner: RecordingMenuInstaller,
        token: CancelToken,
    }

    impl MenuInstaller for CancelAfterFirst {
        fn contains_menu(&self, name: &str) -> bool {
            self.inner.contains_menu(name)
        }

        fn remove_menu(&mut self, name: &str) -> Result<(), InstallError> {
            self.inner.remove_menu(name)
        }

        fn begin_menu(&mut self, header: MenuHeader) -> Result<(), InstallError> {
            self.inner.begin_menu(header)
        }

        fn add_toggle(&mut self, toggle: ToggleDescription) -> Result<(), InstallError> {
            self.token.cancel();
            self.inner.add_toggle(toggle)
        }
    }

    #[test]
    fn cancellation_stops_between_variants() {
        let mut request = request(vec![
            variant("Red", donor("Red", [1.0, 0.0, 0.0, 1.0], &[])),
            variant("Blue", donor("Blue", [0.0, 0.0, 1.0, 1.0], &[])),
        ]);
        request.variants[0].auto_preview = false;
        request.variants[1].auto_preview = false;
        let token = CancelToken::new();
        let mut installer = CancelAfterFirst {
            inner: RecordingMenuInstaller::new(),
            token: token.clone(),
        };

        let report = configurator()
            .execute(
                &request,
                &mut installer,
                &mut MemoryBlobStore::new(),
                &mut SoftwareRenderer::new(),
                &token,
            )
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.variants_created, 1);
        assert_eq!(installer.inner.menu("Colors").unwrap().toggles.len(), 1);
    }

    #[test]
    fn existing_menu_is_rejected_or_replaced() {
        let mut spec = variant("Red", donor("Red", [1.0, 0.0, 0.0, 1.0], &[]));
        spec.auto_preview = false;
        let request = request(vec![spec]);
        let mut installer = RecordingMenuInstaller::new();
        installer
            .begin_menu(MenuHeader {
                name: "Colors".to_string(),
                icon: None,
                parameter: "Old".to_string(),
            })
            .unwrap();

        let error = configurator()
            .execute(
                &request,
                &mut installer,
                &mut MemoryBlobStore::new(),
                &mut SoftwareRenderer::new(),
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(error, ConfigureError::MenuAlreadyExists(name) if name == "Colors"));
        assert_eq!(installer.menu("Colors").unwrap().header.parameter, "Old");

        let replacing = VariantConfigurator::new(ConfiguratorSettings {
            replace_existing_menu: true,
            ..ConfiguratorSettings::default()
        });
        replacing
            .execute(
                &request,
                &mut installer,
                &mut MemoryBlobStore::new(),
                &mut SoftwareRenderer::new(),
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(installer.menus().len(), 1);
        let menu = installer.menu("Colors").unwrap();
        assert_eq!(menu.header.parameter, "ColorSelect");
        assert_eq!(menu.toggles.len(), 1);
    }

    #[test]
    fn previews_without_a_menu() {
        let mut request = request(vec![
            variant("Red", donor("Red", [1.0, 0.0, 0.0, 1.0], &[])),
            VariantSpec {
                name: "Ghost".to_string(),
                donor: None,
                icon: None,
                auto_preview: true,
            },
        ]);
        request.menu_name.clear();
        if let Some(avatar) = request.avatar.as_mut() {
            avatar.set_descriptor(None);
        }
        let configurator = configurator();
        let mut store = MemoryBlobStore::new();
        let mut renderer = SoftwareRenderer::new();

        let handle = configurator
            .generate_preview(&request, 0, &mut store, &mut renderer)
            .unwrap();
        assert_eq!(handle.name, "Preview_Red");
        assert!(matches!(
            configurator.generate_preview(&request, 7, &mut store, &mut renderer),
            Err(ConfigureError::UnknownVariant(7))
        ));

        let all = configurator.generate_all_previews(&request, &mut store, &mut renderer);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].as_ref().unwrap().name, "Preview_Red_1");
        assert_eq!(all[0].as_ref().unwrap().digest, handle.digest);
        assert!(matches!(all[1], Err(ConfigureError::Validation(_))));
        assert!(store
            .get("Preview_Red")
            .unwrap()
            .pixels()
            .any(|pixel| pixel.0 == RED));
    }
}
