//! Load and validate drug safety trial data from CSV

use std::error::Error;

use csv::ReaderBuilder;
use serde::Deserialize;

/// Raw CSV row (fields arrive as strings, may be malformed)
#[derive(Debug, Deserialize)]
struct CsvRowRaw {
    trx: String,
    adverse_effects: String,
    num_effects: String,
    age: String,
}

/// Treatment arm label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arm {
    Drug,
    Placebo,
}

impl Arm {
    pub fn label(self) -> &'static str {
        match self {
            Arm::Drug => "Drug",
            Arm::Placebo => "Placebo",
        }
    }

    fn parse(s: &str) -> Option<Arm> {
        match s.trim() {
            "Drug" => Some(Arm::Drug),
            "Placebo" => Some(Arm::Placebo),
            _ => None,
        }
    }
}

/// Validated subject record
#[derive(Debug)]
pub struct Subject {
    pub arm: Arm,
    pub adverse: bool,
    pub num_effects: String,
    pub age: f64,
}

/// Loaded dataset plus count of rows dropped during validation
pub struct Dataset {
    pub subjects: Vec<Subject>,
    pub skipped: usize,
}

/// Robust yes/no parsing: "yes", "true" and "1" are truthy (case-insensitive)
pub fn is_truthy(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "yes" | "true" | "1")
}

pub fn read_csv(path: &str) -> Result<Dataset, Box<dyn Error>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let mut subjects = Vec::new();
    let mut skipped = 0;

    for result in reader.deserialize() {
        let row: CsvRowRaw = result?;

        let arm = match Arm::parse(&row.trx) {
            Some(a) => a,
            None => {
                skipped += 1;
                continue;
            }
        };
        let age = match row.age.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                skipped += 1;
                continue;
            }
        };

        subjects.push(Subject {
            arm,
            adverse: is_truthy(&row.adverse_effects),
            num_effects: row.num_effects.trim().to_string(),
            age,
        });
    }

    Ok(Dataset { subjects, skipped })
}

impl Dataset {
    pub fn arm_len(&self, arm: Arm) -> usize {
        self.subjects.iter().filter(|s| s.arm == arm).count()
    }

    pub fn adverse_count(&self, arm: Arm) -> usize {
        self.subjects
            .iter()
            .filter(|s| s.arm == arm && s.adverse)
            .count()
    }

    pub fn ages(&self, arm: Arm) -> Vec<f64> {
        self.subjects
            .iter()
            .filter(|s| s.arm == arm)
            .map(|s| s.age)
            .collect()
    }

    /// Contingency table of num_effects levels (rows) by arm (columns: Drug, Placebo).
    /// Levels sort numerically when every level parses as a number, else lexically.
    pub fn effect_contingency(&self) -> (Vec<String>, Vec<f64>) {
        let mut levels: Vec<String> = self
            .subjects
            .iter()
            .map(|s| s.num_effects.clone())
            .collect();
        levels.sort();
        levels.dedup();

        let numeric: Option<Vec<f64>> = levels
            .iter()
            .map(|l| l.parse::<f64>().ok().filter(|v| v.is_finite()))
            .collect();
        if let Some(vals) = numeric {
            let mut order: Vec<usize> = (0..levels.len()).collect();
            order.sort_by(|&a, &b| {
                vals[a]
                    .partial_cmp(&vals[b])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            levels = order.into_iter().map(|i| levels[i].clone()).collect();
        }

        let mut table = vec![0.0; levels.len() * 2];
        for s in &self.subjects {
            let row = levels
                .iter()
                .position(|l| *l == s.num_effects)
                .unwrap_or(0);
            let col = match s.arm {
                Arm::Drug => 0,
                Arm::Placebo => 1,
            };
            table[row * 2 + col] += 1.0;
        }

        (levels, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_csv(name: &str, contents: &str) -> String {
        let path = std::env::temp_dir().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_truthy_parsing() {
        assert!(is_truthy("yes"));
        assert!(is_truthy("Yes"));
        assert!(is_truthy("TRUE"));
        assert!(is_truthy("1"));
        assert!(is_truthy(" yes "));
        assert!(!is_truthy("no"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
        assert!(!is_truthy("2"));
    }

    #[test]
    fn test_read_csv_skips_bad_rows() {
        let path = write_temp_csv(
            "ds_read_test.csv",
            "trx,adverse_effects,num_effects,age\n\
             Drug,Yes,1,62\n\
             Placebo,No,0,55\n\
             Drug,No,0,not_a_number\n\
             Vitamin,Yes,2,40\n\
             Placebo,true,3,71.5\n",
        );
        let data = read_csv(&path).unwrap();
        assert_eq!(data.subjects.len(), 3);
        assert_eq!(data.skipped, 2);
        assert_eq!(data.arm_len(Arm::Drug), 1);
        assert_eq!(data.arm_len(Arm::Placebo), 2);
        assert_eq!(data.adverse_count(Arm::Placebo), 1);
        assert_eq!(data.ages(Arm::Placebo), vec![55.0, 71.5]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_contingency_numeric_level_order() {
        let subjects = vec![
            Subject { arm: Arm::Drug, adverse: true, num_effects: "10".into(), age: 60.0 },
            Subject { arm: Arm::Drug, adverse: false, num_effects: "2".into(), age: 61.0 },
            Subject { arm: Arm::Placebo, adverse: false, num_effects: "2".into(), age: 62.0 },
            Subject { arm: Arm::Placebo, adverse: false, num_effects: "0".into(), age: 63.0 },
        ];
        let data = Dataset { subjects, skipped: 0 };
        let (levels, table) = data.effect_contingency();
        // Numeric order, not lexical ("10" would sort before "2" lexically)
        assert_eq!(levels, vec!["0", "2", "10"]);
        assert_eq!(table, vec![0.0, 1.0, 1.0, 1.0, 1.0, 0.0]);
    }
}
