use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};
use tenant_isolation_core::contract::HandlerKind;
use tenant_isolation_core::stack::{synthesize, StackProps, SEED_BINARY_NAME};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const LAMBDA_PACKAGE: &str = "tenant_isolation_lambda";
const DIST_DIR: &str = "infra/dist";

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the tenant isolation workspace",
    long_about = "A unified CLI for packaging the Lambda handlers, synthesizing the\n\
                  CloudFormation template, and running CI checks."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run CI checks (fmt, clippy, tests)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
    /// Build and package every Lambda binary as `<name>.zip` with a `bootstrap` entry
    ServerlessPackage {
        /// Compilation target triple for Lambda binaries
        #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
        target: String,
        /// Build profile used for binaries
        #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
        profile: BuildProfile,
    },
    /// Write the CloudFormation template for the stack
    Synth {
        /// Stack name, used to prefix function and table names
        #[arg(long, default_value = "TenantIsolation")]
        stack_name: String,
        /// Bucket the packaged Lambda zips are uploaded to
        #[arg(long, env = "ARTIFACT_BUCKET")]
        artifact_bucket: String,
        /// Key prefix of the packaged Lambda zips inside the artifact bucket
        #[arg(long)]
        artifact_prefix: Option<String>,
        /// Name of the tenant data bucket
        #[arg(long)]
        bucket_name: Option<String>,
        /// Fixed session tag value, or `request` to tag with the requested tenant
        #[arg(long)]
        session_tag_value: Option<String>,
        /// Lambda architecture matching the packaged binaries
        #[arg(value_enum, long, default_value_t = Architecture::X86_64)]
        architecture: Architecture,
        /// Output file path
        #[arg(long, default_value = "infra/template.json")]
        output: PathBuf,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Package the Lambda artifacts and synthesize the template
    Package,
    /// Run check + package
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildProfile {
    Debug,
    Release,
}

impl BuildProfile {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }

    fn as_cargo_flag(self) -> Option<&'static str> {
        match self {
            Self::Debug => None,
            Self::Release => Some("--release"),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Architecture {
    #[value(name = "x86_64")]
    X86_64,
    Arm64,
}

impl Architecture {
    fn as_lambda_value(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Arm64 => "arm64",
        }
    }
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn lambda_binaries() -> Vec<&'static str> {
    HandlerKind::ALL
        .iter()
        .map(|kind| kind.binary_name())
        .chain(std::iter::once(SEED_BINARY_NAME))
        .collect()
}

fn package_serverless_lambdas(target: &str, profile: BuildProfile) {
    ensure_rust_target_installed(target);
    ensure_c_linker_available(target);

    step("Build lambda binaries");

    let mut cargo_args = vec!["build", "-p", LAMBDA_PACKAGE, "--target", target, "--bins"];
    if let Some(flag) = profile.as_cargo_flag() {
        cargo_args.push(flag);
    }
    run_cargo(&cargo_args);

    step("Package lambda zip artifacts");
    let target_dir = Path::new("target").join(target).join(profile.dir_name());
    let dist_dir = Path::new(DIST_DIR);
    fs::create_dir_all(dist_dir).expect("failed to create lambda dist directory");

    let mut packaged = Vec::new();
    for bin in lambda_binaries() {
        let zip_path = dist_dir.join(format!("{bin}.zip"));
        package_lambda_zip(&target_dir.join(binary_name(bin, target)), &zip_path);
        packaged.push(zip_path);
    }

    eprintln!("\nPackaged artifacts:");
    for path in packaged {
        eprintln!("- {}", path.display());
    }
}

fn ensure_rust_target_installed(target: &str) {
    let output = Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output();

    let output = match output {
        Ok(value) => value,
        Err(error) => {
            eprintln!(
                "warning: failed to run `rustup target list --installed` ({error}); continuing without target preflight"
            );
            return;
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "failed to list installed rust targets; run `rustup target list --installed` manually. details: {}",
            stderr.trim()
        );
    }

    let installed = String::from_utf8_lossy(&output.stdout);
    if !installed.lines().any(|line| line.trim() == target) {
        panic!(
            "required rust target `{target}` is not installed. install it with `rustup target add {target}` and re-run `cargo run -p xtask -- serverless-package`"
        );
    }
}

fn ensure_c_linker_available(target: &str) {
    if !cfg!(windows) || !target.contains("linux") {
        return;
    }

    let env_override_keys = [
        format!("CC_{}", target.replace('-', "_")),
        format!("CC_{target}"),
        "TARGET_CC".to_string(),
        "CC".to_string(),
    ];

    for key in env_override_keys {
        if let Ok(value) = std::env::var(&key) {
            let candidate = value.trim();
            if candidate.is_empty() {
                continue;
            }
            if tool_works(candidate) {
                return;
            }
        }
    }

    let arch = target.split('-').next().unwrap_or("x86_64");
    let canonical = format!("{arch}-linux-gnu-gcc");
    if tool_works(&canonical) {
        return;
    }

    panic!(
        "missing C cross-linker for target `{target}`. install `{canonical}` (or set CC_{}) before running `cargo run -p xtask -- serverless-package`.\n\
         Tip: the TLS crates behind the AWS SDK and reqwest (ring, aws-lc-sys) need a Linux C toolchain when cross-compiling from Windows.",
        target.replace('-', "_")
    );
}

fn tool_works(program: &str) -> bool {
    let mut parts = program.split_whitespace();
    let Some(bin) = parts.next() else {
        return false;
    };
    let args: Vec<&str> = parts.collect();

    Command::new(bin)
        .args(&args)
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn binary_name(bin_name: &str, target: &str) -> String {
    if target.contains("windows") {
        format!("{bin_name}.exe")
    } else {
        bin_name.to_string()
    }
}

fn package_lambda_zip(binary_path: &Path, zip_path: &Path) {
    if !binary_path.exists() {
        panic!("expected lambda binary at '{}'", binary_path.display());
    }

    let binary = fs::read(binary_path).expect("failed to read lambda binary");
    let file = fs::File::create(zip_path).expect("failed to create lambda zip");
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    zip.start_file("bootstrap", options)
        .expect("failed to start bootstrap entry in lambda zip");
    zip.write_all(&binary)
        .expect("failed to write bootstrap entry");
    zip.finish().expect("failed to finish lambda zip");
}

fn write_template(props: &StackProps, output: &Path) {
    step("Synthesize CloudFormation template");

    let template = synthesize(props)
        .to_json_pretty()
        .expect("failed to serialize template");
    if let Some(parent) = output.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent).expect("failed to create template directory");
    }
    fs::write(output, template).expect("failed to write template");

    eprintln!(
        "\nWrote template for stack `{}` to {}",
        props.stack_name,
        output.display()
    );
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);

    step("Test tenant_isolation_core");
    run_cargo(&["test", "-p", "tenant_isolation_core"]);

    step("Test tenant_isolation_lambda");
    run_cargo(&["test", "-p", LAMBDA_PACKAGE]);
}

fn ci_package() {
    package_serverless_lambdas("x86_64-unknown-linux-gnu", BuildProfile::Release);
    write_template(
        &StackProps::new("TenantIsolation", "ci-artifacts"),
        Path::new(DIST_DIR).join("template.json").as_path(),
    );
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ci { job } => {
            match job {
                CiJob::Check => ci_check(),
                CiJob::Package => ci_package(),
                CiJob::All => {
                    ci_check();
                    ci_package();
                }
            }
            eprintln!("\nCI job passed.");
        }
        Commands::ServerlessPackage { target, profile } => {
            package_serverless_lambdas(&target, profile);
        }
        Commands::Synth {
            stack_name,
            artifact_bucket,
            artifact_prefix,
            bucket_name,
            session_tag_value,
            architecture,
            output,
        } => {
            let mut props = StackProps::new(stack_name, artifact_bucket);
            if let Some(prefix) = artifact_prefix {
                props.artifact_prefix = prefix;
            }
            if let Some(bucket_name) = bucket_name {
                props.bucket_name = bucket_name;
            }
            props.session_tag_value = session_tag_value;
            props.architecture = architecture.as_lambda_value().to_string();
            write_template(&props, &output);
        }
    }
}
