use crate::configurator::{MenuRequest, VariantSpec};
use crate::scene::NodeId;
use std::collections::BTreeMap;

/// Something that keeps a request from being executed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationIssue {
    #[error("no avatar selected")]
    MissingAvatar,
    #[error("no target object selected")]
    MissingTarget,
    #[error("target '{0}' is not part of the avatar")]
    TargetNotFound(String),
    #[error("target '{0}' has no renderers")]
    TargetWithoutRenderables(String),
    #[error("menu name is empty")]
    EmptyMenuName,
    #[error("no variants to create")]
    NoVariants,
    #[error("variant {index} has no name")]
    EmptyVariantName { index: usize },
    #[error("variant '{variant}' has no source object")]
    MissingDonor { variant: String },
    #[error("variant '{variant}' source object has no renderers")]
    DonorWithoutRenderables { variant: String },
    #[error("variant name '{0}' is used more than once")]
    DuplicateVariantName(String),
}

/// Resolve the request's target below the avatar root, if it can be.
pub(crate) fn target_node(request: &MenuRequest) -> Option<NodeId> {
    let avatar = request.avatar.as_ref()?;
    let path = request.target_path.trim_matches('/');
    if path.is_empty() {
        return None;
    }
    let root = avatar.root();
    avatar
        .find_path(root, path)
        .filter(|target| *target != root && avatar.is_descendant_of(*target, root))
}

/// Check everything `execute` needs. An empty list means ready.
pub fn validate(request: &MenuRequest) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    validate_scene(request, &mut issues);

    if request.menu_name.trim().is_empty() {
        issues.push(ValidationIssue::EmptyMenuName);
    }
    if request.variants.is_empty() {
        issues.push(ValidationIssue::NoVariants);
    }
    for (index, variant) in request.variants.iter().enumerate() {
        validate_variant(index, variant, &mut issues);
    }

    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    for variant in &request.variants {
        let name = variant.name.trim();
        if !name.is_empty() {
            *seen.entry(name).or_default() += 1;
        }
    }
    // Reported in declaration order, once per name.
    let mut reported = Vec::new();
    for variant in &request.variants {
        let name = variant.name.trim();
        if seen.get(name).copied().unwrap_or(0) > 1 && !reported.contains(&name) {
            reported.push(name);
            issues.push(ValidationIssue::DuplicateVariantName(name.to_string()));
        }
    }

    issues
}

/// Checks for previewing a single variant: no menu or uniqueness rules.
pub fn validate_preview(request: &MenuRequest, index: usize) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    validate_scene(request, &mut issues);
    if let Some(variant) = request.variants.get(index) {
        validate_variant(index, variant, &mut issues);
    }
    issues
}

fn validate_scene(request: &MenuRequest, issues: &mut Vec<ValidationIssue>) {
    let Some(avatar) = request.avatar.as_ref() else {
        issues.push(ValidationIssue::MissingAvatar);
        return;
    };
    if request.target_path.trim_matches('/').is_empty() {
        issues.push(ValidationIssue::MissingTarget);
        return;
    }
    match target_node(request) {
        None => issues.push(ValidationIssue::TargetNotFound(request.target_path.clone())),
        Some(target) if avatar.renderable_count(target) == 0 => issues.push(
            ValidationIssue::TargetWithoutRenderables(request.target_path.clone()),
        ),
        Some(_) => {}
    }
}

fn validate_variant(index: usize, variant: &VariantSpec, issues: &mut Vec<ValidationIssue>) {
    if variant.name.trim().is_empty() {
        issues.push(ValidationIssue::EmptyVariantName { index });
    }
    match variant.donor.as_ref() {
        None => issues.push(ValidationIssue::MissingDonor {
            variant: variant.name.clone(),
        }),
        Some(donor) if donor.renderable_count(donor.root()) == 0 => {
            issues.push(ValidationIssue::DonorWithoutRenderables {
                variant: variant.name.clone(),
            })
        }
        Some(_) => {}
    }
}
