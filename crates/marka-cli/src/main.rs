//! marka - Query markers on compiled type images
//!
//! This tool loads a directory of compiled type images and answers marker
//! presence queries across both the reflection and the binary tier.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use marka_core::image::IMAGE_EXTENSION;
use marka_core::runtime::TypeRegistry;
use marka_core::{
    AccessorConfig, Catalog, ImageRenderer, ImageSource, LiveReflection, Marker, MarkerAccessor,
    MarkerMatch, MemoryImageSource, NamedMarker, ProtoImageDecoder, Tier,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Query markers on compiled type images
#[derive(Parser, Debug)]
#[command(name = "marka")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding the compiled type images
    #[arg(short, long, env = "MARKA_DIR")]
    dir: PathBuf,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check whether a type or one of its fields carries a marker
    Check(CheckArgs),
    /// List the given markers present on a type and its fields
    List(ListArgs),
    /// Print the compiled image of a type
    Dump {
        /// Qualified type name
        #[arg(short = 't', long = "type")]
        type_name: String,
    },
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Qualified type name
    #[arg(short = 't', long = "type")]
    type_name: String,

    /// Marker form (short, partial or fully qualified); repeat for aliases
    #[arg(short, long = "marker", required = true)]
    markers: Vec<String>,

    /// Check this field instead of the type
    #[arg(short, long)]
    field: Option<String>,

    /// Search ancestors as well
    #[arg(long)]
    inherits: bool,

    #[command(flatten)]
    policy: PolicyArgs,
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Qualified type name
    #[arg(short = 't', long = "type")]
    type_name: String,

    /// Marker to look for; repeat for each marker
    #[arg(short, long = "marker", required = true)]
    markers: Vec<String>,

    /// Search ancestors as well
    #[arg(long)]
    inherits: bool,

    #[command(flatten)]
    policy: PolicyArgs,
}

#[derive(Args, Debug)]
struct PolicyArgs {
    /// Marker names to treat as absent
    #[arg(long = "ignore")]
    ignored: Vec<String>,

    /// Treat unreadable images as carrying no binary-tier markers
    #[arg(long)]
    suppress: bool,
}

impl PolicyArgs {
    fn config(&self) -> AccessorConfig {
        AccessorConfig::new()
            .ignored_names(self.ignored.iter().cloned())
            .suppress_decode_errors(self.suppress)
    }
}

/// Images found on disk, deduplicated by declared type name
#[derive(Default)]
struct ImageIndex {
    /// Maps type name -> (content_hash, origin path)
    seen: HashMap<String, (String, PathBuf)>,
    source: MemoryImageSource,
    /// Statistics
    stats: IndexStats,
}

#[derive(Default)]
struct IndexStats {
    files_read: usize,
    unreadable: usize,
    duplicates_skipped: usize,
    conflicts_skipped: usize,
}

impl ImageIndex {
    fn new() -> Self {
        Self::default()
    }

    /// Compute a short hash of the content (first 8 chars of blake3)
    fn content_hash(content: &[u8]) -> String {
        let hash = blake3::hash(content);
        hash.to_hex()[..8].to_string()
    }

    /// Register an image under its declared name; the first image of a type
    /// wins. Returns true if the image was stored.
    fn register(&mut self, type_name: &str, content: Vec<u8>, origin: &Path) -> bool {
        let content_hash = Self::content_hash(&content);

        if let Some((seen_hash, seen_path)) = self.seen.get(type_name) {
            if *seen_hash == content_hash {
                debug!("Skipping duplicate: {} (hash: {})", type_name, content_hash);
                self.stats.duplicates_skipped += 1;
            } else {
                warn!(
                    "Conflicting image for {}: keeping {} (hash: {}), skipping {} (hash: {})",
                    type_name,
                    seen_path.display(),
                    seen_hash,
                    origin.display(),
                    content_hash
                );
                self.stats.conflicts_skipped += 1;
            }
            return false;
        }

        self.seen.insert(
            type_name.to_string(),
            (content_hash, origin.to_path_buf()),
        );
        self.source.insert(type_name, content);
        true
    }

    fn len(&self) -> usize {
        self.source.len()
    }

    fn print_summary(&self) {
        info!(
            "Summary: {} files read, {} types indexed, {} duplicates skipped, {} conflicts skipped, {} unreadable",
            self.stats.files_read,
            self.len(),
            self.stats.duplicates_skipped,
            self.stats.conflicts_skipped,
            self.stats.unreadable
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let index = load_directory(&cli.dir)?;
    index.print_summary();

    match &cli.command {
        Command::Check(args) => run_check(&index.source, args),
        Command::List(args) => run_list(&index.source, args),
        Command::Dump { type_name } => run_dump(&index.source, type_name),
    }
}

/// Walk a directory and index every image by the type name it declares
fn load_directory(directory: &Path) -> Result<ImageIndex> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let decoder = ProtoImageDecoder::new();
    let mut index = ImageIndex::new();

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !path.is_file() || is_hidden(path) {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(IMAGE_EXTENSION) {
            trace!("Skipping non-image: {}", path.display());
            continue;
        }

        let content = fs::read(path)
            .with_context(|| format!("Failed to read image: {}", path.display()))?;
        index.stats.files_read += 1;

        // Index by declared name, which may differ from the file location
        match decoder.parse(&content) {
            Ok(image) => {
                trace!("Read {} from {}", image.name, path.display());
                index.register(&image.name, content, path);
            }
            Err(e) => {
                warn!("Error reading {}: {}", path.display(), e);
                index.stats.unreadable += 1;
            }
        }
    }

    Ok(index)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Build a marker from command line forms
fn marker_from_forms(forms: &[String], inherits: bool) -> NamedMarker {
    NamedMarker::new(forms.iter().cloned()).inheritable(inherits)
}

fn describe(found: &MarkerMatch) -> String {
    let tier = match found.tier {
        Tier::Reflection => "reflection",
        Tier::Binary => "binary",
    };
    format!("{} ({} tier, on {})", found.descriptor, tier, found.owner)
}

fn run_check(source: &MemoryImageSource, args: &CheckArgs) -> Result<()> {
    let mut registry = TypeRegistry::new();
    let target = registry
        .load(source, &args.type_name)
        .with_context(|| format!("Failed to load type: {}", args.type_name))?;

    let marker = marker_from_forms(&args.markers, args.inherits);
    let catalog: Catalog = vec![marker.clone().shared()];
    let mut accessor = MarkerAccessor::new(catalog, target, &LiveReflection, source)
        .with_config(args.policy.config());

    let found = match &args.field {
        Some(field) => accessor.find_on_field(field, &marker)?,
        None => accessor.find_on_type(&marker)?,
    };

    match found {
        Some(found) => {
            info!("Found {}", describe(&found));
            println!("present");
        }
        None => println!("absent"),
    }
    Ok(())
}

fn run_list(source: &MemoryImageSource, args: &ListArgs) -> Result<()> {
    let mut registry = TypeRegistry::new();
    let target = registry
        .load(source, &args.type_name)
        .with_context(|| format!("Failed to load type: {}", args.type_name))?;

    let catalog: Catalog = args
        .markers
        .iter()
        .map(|form| marker_from_forms(std::slice::from_ref(form), args.inherits).shared())
        .collect();
    let fields: Vec<String> = target.fields().iter().map(|f| f.name.clone()).collect();
    let mut accessor = MarkerAccessor::new(catalog, target, &LiveReflection, source)
        .with_config(args.policy.config());

    for (marker, found) in accessor.catalog_on_type()? {
        println!("{}: {}", marker.name(), describe(&found));
    }
    for field in &fields {
        for (marker, found) in accessor.catalog_on_field(field)? {
            println!("{}.{}: {}", field, marker.name(), describe(&found));
        }
    }
    Ok(())
}

fn run_dump(source: &MemoryImageSource, type_name: &str) -> Result<()> {
    let bytes = source
        .fetch_compiled_bytes(type_name)
        .with_context(|| format!("Failed to fetch image: {}", type_name))?;
    let image = ProtoImageDecoder::new()
        .parse(&bytes)
        .with_context(|| format!("Failed to decode image: {}", type_name))?;
    print!("{}", ImageRenderer::new(&image).render());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use marka_core::image::MarkerRecord;
    use marka_core::{DirectoryImageSource, TypeImage};
    use prost::Message;
    use tempfile::TempDir;

    fn write_image(root: &Path, relative: &str, image: &TypeImage) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, image.encode_to_vec()).unwrap();
        path
    }

    #[test]
    fn test_content_hash() {
        let hash1 = ImageIndex::content_hash(b"hello");
        let hash2 = ImageIndex::content_hash(b"hello");
        let hash3 = ImageIndex::content_hash(b"world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 8);
    }

    #[test]
    fn test_image_index_deduplication() {
        let mut index = ImageIndex::new();
        let origin = Path::new("a/Point.timg");

        assert!(index.register("a.Point", b"one".to_vec(), origin));
        assert!(!index.register("a.Point", b"one".to_vec(), Path::new("b/Point.timg")));
        assert_eq!(index.stats.duplicates_skipped, 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_image_index_conflict_keeps_first() {
        let mut index = ImageIndex::new();

        assert!(index.register("a.Point", b"first".to_vec(), Path::new("x.timg")));
        assert!(!index.register("a.Point", b"second".to_vec(), Path::new("y.timg")));
        assert_eq!(index.stats.conflicts_skipped, 1);
        assert_eq!(
            index.source.fetch_compiled_bytes("a.Point").unwrap().as_ref(),
            b"first"
        );
    }

    #[test]
    fn test_load_directory() {
        let dir = TempDir::new().unwrap();
        let layout = DirectoryImageSource::new(dir.path());

        let base = TypeImage::named("com.example.Base")
            .with_marker(MarkerRecord::class("Lcom/example/Tracked;"));
        let point = TypeImage::named("com.example.Point").extending("com.example.Base");

        write_image(dir.path(), "com/example/Base.timg", &base);
        write_image(dir.path(), "com/example/Point.timg", &point);
        // Same content under another path
        write_image(dir.path(), "copies/Point.timg", &point);
        fs::write(dir.path().join("com/example/Broken.timg"), [0xFFu8, 0xFF]).unwrap();
        fs::write(dir.path().join("README.md"), "not an image").unwrap();

        let index = load_directory(dir.path()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.stats.files_read, 4);
        assert_eq!(index.stats.duplicates_skipped, 1);
        assert_eq!(index.stats.unreadable, 1);
        assert_eq!(
            layout
                .type_name_for(&layout.path_for("com.example.Point").unwrap())
                .as_deref(),
            Some("com.example.Point")
        );

        let mut registry = TypeRegistry::new();
        let target = registry.load(&index.source, "com.example.Point").unwrap();
        let tracked = marker_from_forms(&["Tracked".to_string()], true);
        let mut accessor =
            MarkerAccessor::new(vec![tracked.clone().shared()], target, &LiveReflection, &index.source);
        let found = accessor.find_on_type(&tracked).unwrap().unwrap();
        assert_eq!(found.owner, "com.example.Base");
        assert_eq!(found.tier, Tier::Binary);
    }

    #[test]
    fn test_load_directory_rejects_missing() {
        let dir = TempDir::new().unwrap();
        assert!(load_directory(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_marker_from_forms() {
        let marker = marker_from_forms(&["Nonnull".to_string(), "javax.annotation.Nonnull".to_string()], false);
        assert_eq!(marker.textual_forms(), vec!["Nonnull", "javax.annotation.Nonnull"]);
        assert!(!marker.inherits());
        assert!(marker.matches("Ljavax/annotation/Nonnull;"));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
