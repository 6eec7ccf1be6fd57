//! Chirp scans: repeating a segment over several trial chirp rates and
//! steering the rate toward the largest probe response.
//!
//! The first two trials sit at the configured bounds. Every later trial uses
//! the mean of the two most recent trial chirps, after the more recent of the
//! two has been replaced by the older one if the response dropped between
//! them. The scan always runs the configured number of trials.

use std::{
    fs,
    io::{ self, BufWriter, Write },
    path::Path,
};
use crate::{ config::SegmentDesc, occupancy::Probes };

/// Chirp used for one trial and the response it produced.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TrialRecord {
    pub chirp: f64,
    pub response: f64,
}

/// The two most recent trials, `(prev, curr)`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Window(pub TrialRecord, pub TrialRecord);

impl Window {
    fn push(&mut self, rec: TrialRecord) { self.0 = self.1; self.1 = rec; }
}

/// One search step: returns the record to keep in place of `curr` and the
/// chirp of the next trial.
pub fn bisect(window: &Window) -> (TrialRecord, f64) {
    let Window(prev, curr) = *window;
    let next = (prev.chirp + curr.chirp) / 2.0;
    let kept = if curr.response - prev.response < 0.0 { prev } else { curr };
    (kept, next)
}

/// Search state across the trials of one segment.
#[derive(Clone, Debug, PartialEq)]
pub struct ChirpSearch {
    bounds: (f64, f64),
    trials: usize,
    first: Option<TrialRecord>,
    window: Option<Window>,
    next: f64,
    recorded: usize,
}

impl ChirpSearch {
    pub fn new(chirp_min: f64, chirp_max: f64, trials: usize) -> Self {
        Self {
            bounds: (chirp_min, chirp_max),
            trials,
            first: None,
            window: None,
            next: 0.0,
            recorded: 0,
        }
    }

    pub fn from_segment(seg: &SegmentDesc) -> Self {
        Self::new(seg.chirp_min, seg.chirp_max, seg.no_of_chirps)
    }

    pub fn trials(&self) -> usize { self.trials }

    /// Chirp rate for trial `s`. Single-trial segments are unchirped.
    pub fn chirp(&self, s: usize) -> f64 {
        if self.trials <= 1 { return 0.0; }
        match s {
            0 => self.bounds.0,
            1 => self.bounds.1,
            _ => self.next,
        }
    }

    /// Record the outcome of the next trial and, unless it was the last one,
    /// compute the chirp of the one after.
    pub fn record(&mut self, rec: TrialRecord) {
        let s = self.recorded;
        self.recorded += 1;
        if let Some(w) = self.window.as_mut() {
            w.push(rec);
        } else if let Some(first) = self.first {
            self.window = Some(Window(first, rec));
        } else {
            self.first = Some(rec);
        }
        if s + 1 >= self.trials { return; }
        if let Some(w) = self.window.as_mut() {
            let (kept, next) = bisect(w);
            w.1 = kept;
            self.next = next;
        }
    }

    /// The two most recent (possibly replaced) trials.
    pub fn window(&self) -> Option<&Window> { self.window.as_ref() }
}

/// One line of a chirp table.
#[derive(Clone, Debug, PartialEq)]
pub struct ChirpRow {
    /// Trial index.
    pub step: usize,
    /// Chirp rate, or laser phase for phase scans.
    pub param: f64,
    /// Probe populations at the end of the trial.
    pub populations: Vec<f64>,
}

/// File name of the chirp table of segment `segment`.
pub fn chirp_name(segment: usize) -> String { format!("Chirp_{}.txt", segment) }

/// Write a chirp table as tab-separated text.
pub fn write_chirps<P>(path: P, probes: &Probes, rows: &[ChirpRow])
    -> io::Result<()>
where P: AsRef<Path>
{
    let mut out = BufWriter::new(fs::File::create(path)?);
    writeln!(out, "# step\tchirp\t{}", probes.header())?;
    for row in rows.iter() {
        write!(out, "{}\t{:.8}", row.step, row.param)?;
        for p in row.populations.iter() { write!(out, "\t{:.8}", p)?; }
        writeln!(out)?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(chirp: f64, response: f64) -> TrialRecord {
        TrialRecord { chirp, response }
    }

    #[test]
    fn bisect_keeps_better_side() {
        let (kept, next) = bisect(&Window(rec(0.0, 1.0), rec(1.0, 2.0)));
        assert_eq!(kept, rec(1.0, 2.0));
        assert_eq!(next, 0.5);
        let (kept, next) = bisect(&Window(rec(0.0, 1.0), rec(1.0, 0.5)));
        assert_eq!(kept, rec(0.0, 1.0));
        assert_eq!(next, 0.5);
    }

    #[test]
    fn bounds_then_midpoints() {
        let mut search = ChirpSearch::new(0.1, 0.5, 3);
        assert_eq!(search.chirp(0), 0.1);
        search.record(rec(0.1, 0.2));
        assert_eq!(search.chirp(1), 0.5);
        search.record(rec(0.5, 0.4));
        assert!((search.chirp(2) - 0.3).abs() < 1e-15);
        search.record(rec(0.3, 0.9));
        // last trial does not bisect
        assert_eq!(search.window().unwrap().1, rec(0.3, 0.9));
    }

    #[test]
    fn falling_response_reuses_older_chirp() {
        let mut search = ChirpSearch::new(0.0, 1.0, 5);
        search.record(rec(0.0, 1.0));
        search.record(rec(1.0, 0.0));
        // fell: 1.0 is replaced by 0.0
        assert_eq!(search.chirp(2), 0.5);
        search.record(rec(0.5, 2.0));
        // rose from the kept 0.0 trial
        assert_eq!(search.chirp(3), 0.25);
        search.record(rec(0.25, 1.5));
        // fell from 0.5
        assert_eq!(search.chirp(4), 0.375);
    }

    #[test]
    fn single_trial_is_unchirped() {
        let search = ChirpSearch::new(3.0, 4.0, 1);
        assert_eq!(search.chirp(0), 0.0);
    }

    #[test]
    fn writes_table() {
        let dir = tempfile::tempdir().unwrap();
        let probes = Probes::new(1, vec![[0.0; 3], [1.0, 0.0, 0.0]], 0.1);
        let rows = vec![
            ChirpRow { step: 0, param: 0.1, populations: vec![1.0, 0.0] },
            ChirpRow { step: 1, param: 0.5, populations: vec![0.25, 0.75] },
        ];
        let path = dir.path().join(chirp_name(3));
        write_chirps(&path, &probes, &rows).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# step\tchirp\t(0)\t(1)");
        assert_eq!(lines[2], "1\t0.50000000\t0.25000000\t0.75000000");
        assert_eq!(lines.len(), 3);
    }
}
