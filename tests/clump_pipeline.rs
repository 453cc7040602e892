use approx::assert_abs_diff_eq;
use flate2::Compression;
use flate2::write::GzEncoder;
use gnomon_clump::config::ClumpConfig;
use gnomon_clump::diagnostics::CollectedDiagnostics;
use gnomon_clump::engine::{ClumpMode, clump_by_chromosome, run_clumping};
use gnomon_clump::ingest::{LocusTable, merge_secondary, read_summary_statistics};
use gnomon_clump::links::{read_coverage, read_link_graph};
use gnomon_clump::locus::ClumpState;
use gnomon_clump::types::LocusIndex;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{TempDir, tempdir};

const BASE: &str = "\
SNP CHR BP A1 A2 OR SE P
rs1 1 100 A G 1.30 0.05 1e-10
rs2 1 200 C T 1.10 0.02 1e-6
rs3 1 300 G A 0.95 0.04 1e-4
rs4 2 150 T C 1.05 0.03 0.01
rs5 2 250 A C 0.90 0.06 0.02
";

const SECONDARY: &str = "\
SNP CHR BP A1 A2 OR SE P
rs2 1 200 T C 0.91 0.02 2e-6
rs3 1 300 G A 0.97 0.04 3e-4
rs9 3 900 A G 1.00 0.10 0.5
";

const LINKS: &str = "\
SNP_A SNP_B R2
rs1 rs2 0.9
rs1 rs3 0.5
rs4 rs5 0.85
";

const COVERAGE: &str = "\
rs1 0,1
rs2 1,2
rs3 1
rs4 5
rs5 5,6
";

struct Inputs {
    dir: TempDir,
    base: PathBuf,
    secondary: PathBuf,
    links: PathBuf,
    coverage: PathBuf,
}

fn write_inputs() -> Inputs {
    let dir = tempdir().expect("temporary directory");
    let base = dir.path().join("base.txt.gz");
    let mut encoder = GzEncoder::new(File::create(&base).expect("create base"), Compression::default());
    encoder.write_all(BASE.as_bytes()).expect("write base");
    encoder.finish().expect("finish gzip");

    let secondary = dir.path().join("secondary.txt");
    let links = dir.path().join("pairs.ld");
    let coverage = dir.path().join("coverage.txt");
    fs::write(&secondary, SECONDARY).expect("write secondary");
    fs::write(&links, LINKS).expect("write links");
    fs::write(&coverage, COVERAGE).expect("write coverage");

    Inputs {
        dir,
        base,
        secondary,
        links,
        coverage,
    }
}

fn load(inputs: &Inputs, diag: &mut CollectedDiagnostics) -> LocusTable {
    let config = ClumpConfig::default();
    let columns = config
        .columns
        .resolve(&inputs.base, diag)
        .expect("resolve base columns");
    let mut table = read_summary_statistics(&inputs.base, &columns, diag).expect("read base");
    read_coverage(&inputs.coverage, &mut table, None, diag).expect("read coverage");
    read_link_graph(&inputs.links, &mut table, diag).expect("read links");
    table
}

fn ids(table: &LocusTable, indices: &[LocusIndex]) -> Vec<String> {
    indices
        .iter()
        .map(|idx| table.get(*idx).expect("index in range").id().to_string())
        .collect()
}

#[test]
fn exact_pipeline_keeps_partially_explained_variants() {
    let inputs = write_inputs();
    let mut diag = CollectedDiagnostics::new();
    let mut table = load(&inputs, &mut diag);

    let outcome = clump_by_chromosome(table.loci_mut(), ClumpMode::Exact, &mut diag);

    assert_eq!(ids(&table, &outcome.retained), vec!["rs1", "rs2", "rs4", "rs5"]);
    assert_eq!(ids(&table, &outcome.index_loci), vec!["rs1", "rs2", "rs4", "rs5"]);
    assert_eq!(outcome.clumped, 1);

    let rs2 = table.get(table.find("rs2").expect("rs2")).expect("rs2 record");
    assert_eq!(rs2.coverage().bins().collect::<Vec<_>>(), vec![2]);
    let rs3 = table.get(table.find("rs3").expect("rs3")).expect("rs3 record");
    assert_eq!(rs3.state(), ClumpState::Clumped);
    assert!(diag.failures.is_empty());
}

#[test]
fn proxy_pipeline_absorbs_strongly_linked_coverage() {
    let inputs = write_inputs();
    let mut diag = CollectedDiagnostics::new();
    let mut table = load(&inputs, &mut diag);

    let config = ClumpConfig::from_toml_str("[clump]\nmode = \"proxy\"\n").expect("config");
    let outcome = run_clumping(table.loci_mut(), config.mode());

    assert_eq!(ids(&table, &outcome.retained), vec!["rs1", "rs4"]);
    assert_eq!(outcome.clumped, 3);

    let rs1 = table.get(LocusIndex(0)).expect("rs1 record");
    assert_eq!(rs1.coverage().bins().collect::<Vec<_>>(), vec![0, 1, 2]);
    let rs4 = table.get(LocusIndex(3)).expect("rs4 record");
    assert_eq!(rs4.coverage().bins().collect::<Vec<_>>(), vec![5, 6]);
}

#[test]
fn secondary_file_flips_before_clumping() {
    let inputs = write_inputs();
    let mut diag = CollectedDiagnostics::new();
    let mut table = load(&inputs, &mut diag);

    let columns = ClumpConfig::default()
        .columns
        .resolve(&inputs.secondary, &mut diag)
        .expect("resolve secondary columns");
    let summary =
        merge_secondary(&mut table, &inputs.secondary, &columns, &mut diag).expect("merge");

    assert_eq!(summary.flipped, 1);
    assert_eq!(summary.matched, 1);
    assert_eq!(summary.absent, 1);

    let rs2 = table.get(LocusIndex(1)).expect("rs2 record");
    assert!(rs2.is_flipped());
    assert_eq!((rs2.reference(), rs2.alternate()), ("C", "T"));
    assert_abs_diff_eq!(rs2.statistic(), 1.10, epsilon = 1e-12);
    assert!(!table.get(LocusIndex(2)).expect("rs3 record").is_flipped());
}

fn run_cli(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_gnomon-clump"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("run gnomon-clump")
}

#[test]
fn cli_writes_retained_variants_in_genomic_order() {
    let inputs = write_inputs();
    let out = inputs.dir.path().join("clumped.tsv");

    let output = run_cli(
        inputs.dir.path(),
        &[
            inputs.base.to_str().expect("path str"),
            "--links",
            inputs.links.to_str().expect("path str"),
            "--coverage",
            inputs.coverage.to_str().expect("path str"),
            "--secondary",
            inputs.secondary.to_str().expect("path str"),
            "--out",
            out.to_str().expect("path str"),
        ],
    );
    assert!(
        output.status.success(),
        "CLI failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let written = fs::read_to_string(&out).expect("read output");
    let rows: Vec<Vec<&str>> = written
        .lines()
        .map(|line| line.split('\t').collect())
        .collect();
    assert_eq!(
        rows[0],
        vec!["SNP", "CHR", "BP", "REF", "ALT", "STAT", "SE", "P", "FLIPPED"]
    );
    let snps: Vec<&str> = rows[1..].iter().map(|row| row[0]).collect();
    assert_eq!(snps, vec!["rs1", "rs2", "rs4", "rs5"]);

    let rs2 = &rows[2];
    assert_eq!(rs2[8], "1");
    let p: f64 = rs2[7].parse().expect("numeric p-value");
    assert_abs_diff_eq!(p, 1e-6, epsilon = 1e-15);
}

#[test]
fn cli_reads_a_secondary_file_with_its_own_layout() {
    let inputs = write_inputs();
    let secondary = inputs.dir.path().join("secondary.csv");
    fs::write(
        &secondary,
        "ID,CHROM,POS,EA,OA,BETA,PVAL\nrs2,1,200,T,C,-0.09,2e-6\nrs3,1,300,G,A,-0.03,3e-4\n",
    )
    .expect("write secondary");
    let config = inputs.dir.path().join("clump.toml");
    fs::write(
        &config,
        r#"
[secondary.columns]
separator = "comma"

[secondary.columns.names]
id = "ID"
chr = "CHROM"
bp = "POS"
reference = "EA"
alternate = "OA"
statistic = "BETA"
p = "PVAL"
"#,
    )
    .expect("write config");
    let out = inputs.dir.path().join("clumped.tsv");

    let output = run_cli(
        inputs.dir.path(),
        &[
            inputs.base.to_str().expect("path str"),
            "--config",
            config.to_str().expect("path str"),
            "--secondary",
            secondary.to_str().expect("path str"),
            "--out",
            out.to_str().expect("path str"),
        ],
    );
    assert!(
        output.status.success(),
        "CLI failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let written = fs::read_to_string(&out).expect("read output");
    let flipped: Vec<(&str, &str)> = written
        .lines()
        .skip(1)
        .map(|line| {
            let row: Vec<&str> = line.split('\t').collect();
            (row[0], row[8])
        })
        .collect();
    assert!(flipped.contains(&("rs2", "1")));
    assert!(flipped.contains(&("rs3", "0")));
}

#[test]
fn cli_rank_order_and_proxy_override() {
    let inputs = write_inputs();

    let output = run_cli(
        inputs.dir.path(),
        &[
            inputs.base.to_str().expect("path str"),
            "--links",
            inputs.links.to_str().expect("path str"),
            "--proxy",
            "0.8",
            "--sequential",
            "--order",
            "rank",
        ],
    );
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).expect("utf8 output");
    let snps: Vec<&str> = stdout
        .lines()
        .skip(1)
        .map(|line| line.split('\t').next().unwrap_or(""))
        .collect();
    assert_eq!(snps, vec!["rs1", "rs4"]);
}

#[test]
fn cli_reports_missing_mandatory_column() {
    let dir = tempdir().expect("temporary directory");
    let base = dir.path().join("base.txt");
    fs::write(&base, "SNP CHR BP A1 A2 OR SE\nrs1 1 100 A G 1.2 0.1\n").expect("write base");

    let output = run_cli(dir.path(), &[base.to_str().expect("path str")]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error: No P column"), "stderr: {stderr}");
}

#[test]
fn cli_rejects_out_of_range_proxy_threshold() {
    let inputs = write_inputs();
    let output = run_cli(
        inputs.dir.path(),
        &[inputs.base.to_str().expect("path str"), "--proxy", "1.5"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("proxy_threshold"));
}
