// ============================================================
// Layer 4 — Procedure Loader
// ============================================================
// Loads annotated assembly procedures from a directory of CSV
// files, one recording per file.
//
// Required header columns (any order, extra columns ignored):
//   verb, this, that, label
//
// Parsing goes through the `csv` crate, so quoted fields with
// embedded commas or line breaks are read as one field.
//
// Rows become keysteps; the file name provides the user / toy /
// recording index metadata. A file that cannot be parsed is
// skipped with a warning so one bad recording never stops the
// whole corpus from loading.
//
// Reference: Rust Book §9 (Error Handling)

use anyhow::{bail, Context, Result};
use std::{fs, path::Path};

use crate::domain::procedure::{Keystep, Procedure, ProcedureFilter, ProcedureMeta, StepLabel};

pub struct ProcedureLoader {
    dir:    String,
    filter: ProcedureFilter,
}

impl ProcedureLoader {
    pub fn new(dir: impl Into<String>, filter: ProcedureFilter) -> Self {
        Self { dir: dir.into(), filter }
    }

    pub fn load_all(&self) -> Result<Vec<Procedure>> {
        let dir = Path::new(&self.dir);
        if !dir.is_dir() {
            bail!("procedure directory '{}' does not exist", self.dir);
        }

        // Sorted so that the corpus order (and therefore the
        // seeded split) does not depend on directory iteration order
        let mut paths: Vec<_> = fs::read_dir(dir)
            .with_context(|| format!("Cannot read directory '{}'", self.dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("csv"))
            .collect();
        paths.sort();

        let mut procedures = Vec::new();
        let mut skipped    = 0usize;
        for path in &paths {
            match load_single_csv(path) {
                Ok(p) if self.filter.keeps(&p) => procedures.push(p),
                Ok(_) => {}
                Err(e) => {
                    skipped += 1;
                    tracing::warn!("Skipping '{}': {e:#}", path.display());
                }
            }
        }

        tracing::info!(
            "Loaded {} procedures ({:?}) from {} files, {} skipped",
            procedures.len(),
            self.filter,
            paths.len(),
            skipped
        );
        Ok(procedures)
    }
}

fn load_single_csv(path: &Path) -> Result<Procedure> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let meta = ProcedureMeta::from_file_name(name)?;
    let (keysteps, labels) = parse_rows(&text)?;
    Ok(Procedure { meta, keysteps, labels })
}

/// Parses the CSV body into keysteps and their labels.
///
/// Columns are found by header name; quoted fields may contain
/// commas and newlines. A leading UTF-8 byte-order mark is ignored.
pub fn parse_rows(text: &str) -> Result<(Vec<Keystep>, Vec<StepLabel>)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let header = reader.headers().context("Cannot read the header row")?.clone();
    if header.iter().all(str::is_empty) {
        bail!("file is empty");
    }
    let column = |name: &str| {
        header
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}') == name)
            .with_context(|| format!("missing '{name}' column"))
    };
    let (verb, this, that, label) = (column("verb")?, column("this")?, column("that")?, column("label")?);
    let needed = verb.max(this).max(that).max(label);

    let mut keysteps = Vec::new();
    let mut labels   = Vec::new();
    for (row_no, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("row {} is not valid CSV", row_no + 1))?;
        if record.len() <= needed {
            bail!("row {} has {} fields, expected at least {}", row_no + 1, record.len(), needed + 1);
        }
        keysteps.push(Keystep::new(&record[verb], &record[this], &record[that]));
        labels.push(
            record[label]
                .parse::<StepLabel>()
                .with_context(|| format!("row {}", row_no + 1))?,
        );
    }

    if keysteps.is_empty() {
        bail!("file has a header but no keystep rows");
    }
    Ok((keysteps, labels))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "\
start_frame,end_frame,verb,this,that,label,remark
10,20,attach,cabin,chassis,correct,
21,30,attach,\"arm connector\",boom,correct,
";

    const MISTAKE: &str = "\
verb,this,that,label
attach,bumper,chassis,mistake
detach,bumper,chassis,correction
attach,bumper,chassis,correct
";

    const NAME_A: &str = "nusar-2021_action_both_9011-c03f_9011_user_id_2021-02-01_154253_0.csv";
    const NAME_B: &str = "nusar-2021_action_both_9012-a01_9012_user_id_2021-02-02_101010_1.csv";

    #[test]
    fn test_parse_rows_by_header_name() {
        let (keysteps, labels) = parse_rows(GOOD).unwrap();
        assert_eq!(keysteps.len(), 2);
        assert_eq!(keysteps[1].token(), "attach-arm_connector-boom");
        assert!(labels.iter().all(|l| *l == StepLabel::Correct));
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let err = parse_rows("verb,this,label\nattach,cabin,correct\n").unwrap_err();
        assert!(err.to_string().contains("'that'"));
    }

    #[test]
    fn test_unknown_label_is_an_error() {
        assert!(parse_rows("verb,this,that,label\nattach,a,b,maybe\n").is_err());
    }

    #[test]
    fn test_quoted_fields_with_commas_and_newlines() {
        let text = "verb,this,that,label,remark\n\
                    attach,\"cabin, front\",chassis,mistake,\"wrong\norder\"\n\
                    detach,cabin,chassis,correction,\n";
        let (keysteps, labels) = parse_rows(text).unwrap();
        assert_eq!(keysteps.len(), 2);
        assert_eq!(keysteps[0].token(), "attach-cabin,_front-chassis");
        assert_eq!(labels, vec![StepLabel::Mistake, StepLabel::Correction]);
    }

    #[test]
    fn test_leading_byte_order_mark_is_ignored() {
        let text = "\u{feff}verb,this,that,label\nattach,cabin,chassis,correct\n";
        let (keysteps, labels) = parse_rows(text).unwrap();
        assert_eq!(keysteps[0].token(), "attach-cabin-chassis");
        assert_eq!(labels, vec![StepLabel::Correct]);
    }

    #[test]
    fn test_short_row_is_an_error() {
        let err = parse_rows("verb,this,that,label\nattach,cabin\n").unwrap_err();
        assert!(err.to_string().contains("row 1 has 2 fields"));
    }

    #[test]
    fn test_bom_file_loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!("\u{feff}{MISTAKE}");
        fs::write(dir.path().join(NAME_B), body).unwrap();

        let loaded = ProcedureLoader::new(dir.path().to_str().unwrap(), ProcedureFilter::All)
            .load_all()
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].keysteps.len(), 3);
    }

    #[test]
    fn test_load_all_filters_and_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(NAME_A), GOOD).unwrap();
        fs::write(dir.path().join(NAME_B), MISTAKE).unwrap();
        fs::write(dir.path().join("broken_name.csv"), GOOD).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let root = dir.path().to_str().unwrap();
        let all = ProcedureLoader::new(root, ProcedureFilter::All).load_all().unwrap();
        assert_eq!(all.len(), 2);

        let correct = ProcedureLoader::new(root, ProcedureFilter::Correct).load_all().unwrap();
        assert_eq!(correct.len(), 1);
        assert_eq!(correct[0].meta.toy, "c03f");

        let mistakes = ProcedureLoader::new(root, ProcedureFilter::Mistake).load_all().unwrap();
        assert_eq!(mistakes.len(), 1);
        assert_eq!(mistakes[0].meta.user, "9012");
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let loader = ProcedureLoader::new("/definitely/not/here", ProcedureFilter::All);
        assert!(loader.load_all().is_err());
    }
}
