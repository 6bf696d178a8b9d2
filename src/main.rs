//! Headless driver: runs one menu job described by a JSON file.
//!
//! ```text
//! variant-previz job.json [--out DIR]
//! ```
//!
//! Scene and settings paths in the job are relative to the job file.
//! Previews are written as PNG files into `output_dir` together with the
//! resulting `menu.json`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use variant_previz::assets::DirectoryBlobStore;
use variant_previz::configurator::{
    CancelToken, ConfigureError, MenuRequest, VariantConfigurator, VariantSpec,
};
use variant_previz::menu::{InstallError, RecordingMenuInstaller};
use variant_previz::render::SoftwareRenderer;
use variant_previz::scene::serialization::{load_scene_from_file, SerializationError};
use variant_previz::settings::{load_settings_from_file, ConfiguratorSettings, SettingsError};

#[derive(Parser, Debug)]
#[command(name = "variant-previz", version)]
struct Cli {
    /// Job description file.
    job: PathBuf,

    /// Write previews and menu.json here instead of the job's output_dir.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, serde::Deserialize)]
struct JobDocument {
    avatar: PathBuf,
    target_path: String,
    menu_name: String,
    #[serde(default)]
    variants: Vec<JobVariant>,
    #[serde(default)]
    settings: Option<PathBuf>,
    #[serde(default = "default_output_dir")]
    output_dir: PathBuf,
}

#[derive(Debug, serde::Deserialize)]
struct JobVariant {
    name: String,
    donor: PathBuf,
    #[serde(default = "default_true")]
    auto_preview: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("previews")
}

fn default_true() -> bool {
    true
}

#[derive(Debug, thiserror::Error)]
enum JobError {
    #[error("failed to read job '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid job '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to load scene '{path}': {source}")]
    Scene {
        path: String,
        #[source]
        source: SerializationError,
    },
    #[error("failed to load settings: {0}")]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Configure(#[from] ConfigureError),
    #[error("failed to write menu: {0}")]
    Menu(#[from] InstallError),
}

fn load_hierarchy(
    base: &Path,
    path: &Path,
) -> Result<variant_previz::scene::Hierarchy, JobError> {
    let path = base.join(path);
    let scene_error = |source| JobError::Scene {
        path: path.display().to_string(),
        source,
    };
    load_scene_from_file(&path)
        .and_then(|document| document.to_hierarchy())
        .map_err(scene_error)
}

fn run(job_path: &Path, out: Option<&Path>) -> Result<(), JobError> {
    let json = std::fs::read_to_string(job_path).map_err(|source| JobError::Read {
        path: job_path.display().to_string(),
        source,
    })?;
    let job: JobDocument = serde_json::from_str(&json).map_err(|source| JobError::Parse {
        path: job_path.display().to_string(),
        source,
    })?;
    let base = job_path.parent().unwrap_or(Path::new("."));

    let settings = match &job.settings {
        Some(path) => load_settings_from_file(&base.join(path))?,
        None => ConfiguratorSettings::default(),
    };

    let mut variants = Vec::with_capacity(job.variants.len());
    for variant in &job.variants {
        variants.push(VariantSpec {
            name: variant.name.clone(),
            donor: Some(load_hierarchy(base, &variant.donor)?),
            icon: None,
            auto_preview: variant.auto_preview,
        });
    }
    let request = MenuRequest {
        avatar: Some(load_hierarchy(base, &job.avatar)?),
        target_path: job.target_path.clone(),
        menu_name: job.menu_name.clone(),
        menu_icon: None,
        variants,
    };

    let output_dir = match out {
        Some(dir) => dir.to_path_buf(),
        None => base.join(&job.output_dir),
    };
    let mut store = DirectoryBlobStore::new(&output_dir);
    let mut installer = RecordingMenuInstaller::new();
    let mut renderer = SoftwareRenderer::new();
    let configurator = VariantConfigurator::new(settings);

    let outcome = configurator.execute(
        &request,
        &mut installer,
        &mut store,
        &mut renderer,
        &CancelToken::new(),
    );
    if let Err(ConfigureError::Validation(issues)) = &outcome {
        for issue in issues {
            log::error!("{}", issue);
        }
    }
    let report = match outcome {
        Ok(report) => report,
        Err(ConfigureError::Fatal { source, report }) => {
            log::error!(
                "Installation stopped after {} variants",
                report.variants_created
            );
            // Keep what was installed before the failure.
            std::fs::create_dir_all(&output_dir).map_err(InstallError::from)?;
            installer.save_to_file(&output_dir.join("menu.json"))?;
            return Err(ConfigureError::Fatal { source, report }.into());
        }
        Err(error) => return Err(error.into()),
    };

    for warning in &report.warnings {
        log::warn!("{}", warning);
    }
    std::fs::create_dir_all(&output_dir).map_err(InstallError::from)?;
    let menu_path = output_dir.join("menu.json");
    installer.save_to_file(&menu_path)?;
    log::info!(
        "Wrote {} ({} variants, {} previews, {} unresolved, {} slot discrepancies)",
        menu_path.display(),
        report.variants_created,
        report.previews_generated,
        report.unresolved_nodes,
        report.slot_discrepancies
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    match run(&cli.job, cli.out.as_deref()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("{}", error);
            ExitCode::FAILURE
        }
    }
}
