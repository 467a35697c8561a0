use std::{
    fs::File,
    io::BufWriter,
    path::Path,
    sync::mpsc::Receiver,
};

use log::{debug, error};
use serde_jsonlines::JsonLinesWriter;

use crate::{errors::GallopError, model::RaceOutcome};

/// Append every result received on `results` to a JSON-lines file until the
/// sending side hangs up. Meant to run on its own thread.
pub fn write_results(file: &Path, results: Receiver<RaceOutcome>) -> Result<usize, GallopError> {
    let results_file = File::create(file).map_err(|e| GallopError::WriterError { source: e })?;
    let mut results_writer = JsonLinesWriter::new(BufWriter::new(results_file));

    let mut written = 0;
    for outcome in &results {
        match results_writer.write(&outcome) {
            Ok(()) => written += 1,
            Err(e) => error!("Error while writing {} to output file: {}", outcome.title(), e),
        }
        // Flushed per result so a crash loses at most the race in flight
        results_writer
            .flush()
            .map_err(|e| GallopError::WriterError { source: e })?;
    }

    debug!("Wrote {} results to {}", written, file.display());
    Ok(written)
}

pub fn read_results(file: &Path) -> Result<Vec<RaceOutcome>, GallopError> {
    serde_jsonlines::json_lines(file)
        .map_err(|e| GallopError::ResultsLoaderError { source: e })?
        .collect::<Result<Vec<RaceOutcome>, std::io::Error>>()
        .map_err(|e| GallopError::ResultsLoaderError { source: e })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{build_program, generate_pool};
    use crate::simulation::compute_outcome;
    use std::{sync::mpsc, thread};
    use tempfile::TempDir;

    #[test]
    fn test_results_feed_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("results.jsonl");
        let program = build_program(&generate_pool(20).unwrap()).unwrap();
        let outcomes: Vec<RaceOutcome> = program
            .iter()
            .take(3)
            .map(|race| compute_outcome(race, &mut rand::thread_rng()))
            .collect();

        let (tx, rx) = mpsc::channel();
        let writer_path = path.clone();
        let writer = thread::spawn(move || write_results(&writer_path, rx));
        for outcome in &outcomes {
            tx.send(outcome.clone()).unwrap();
        }
        drop(tx);

        assert_eq!(writer.join().unwrap().unwrap(), 3);
        let loaded = read_results(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        for (read, sent) in loaded.iter().zip(&outcomes) {
            assert_eq!(read.race_round, sent.race_round);
            assert_eq!(read.completed_at, sent.completed_at);
            for (a, b) in read.rankings.iter().zip(&sent.rankings) {
                assert_eq!(a.position, b.position);
                assert_eq!(a.horse, b.horse);
                assert!((a.time_s - b.time_s).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_missing_results_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            read_results(&temp_dir.path().join("missing.jsonl")),
            Err(GallopError::ResultsLoaderError { .. })
        ));
    }
}
