// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use rust_xlsxwriter::Workbook;

use super::{Classification, SessionError};

const HEADER: [&str; 5] = [
    "file",
    "classification",
    "comments",
    "time_spent_secs",
    "timestamp",
];

/// The files written by an export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exported {
    pub csv: PathBuf,
    pub xlsx: PathBuf,
    pub json: PathBuf,
}

/// Writes the classifications as CSV, XLSX and JSON into the given directory. All files
/// share a timestamped base name.
pub(super) fn export(
    dir: &Path,
    classifications: &[Classification],
    now: DateTime<Local>,
) -> Result<Exported, SessionError> {
    fs::create_dir_all(dir).map_err(|source| SessionError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let base = format!("classifications_{}", now.format("%Y%m%d_%H%M%S"));
    let exported = Exported {
        csv: dir.join(format!("{}.csv", base)),
        xlsx: dir.join(format!("{}.xlsx", base)),
        json: dir.join(format!("{}.json", base)),
    };

    write_csv(&exported.csv, classifications)?;
    write_xlsx(&exported.xlsx, classifications)?;

    let file = fs::File::create(&exported.json).map_err(|source| SessionError::Io {
        path: exported.json.clone(),
        source,
    })?;
    serde_json::to_writer_pretty(file, classifications)?;

    Ok(exported)
}

fn write_csv(path: &Path, classifications: &[Classification]) -> Result<(), SessionError> {
    let mut writer = csv::Writer::from_path(path)?;
    if classifications.is_empty() {
        writer.write_record(HEADER)?;
    }
    for classification in classifications {
        writer.serialize(classification)?;
    }
    writer.flush().map_err(|source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// One worksheet with the same columns as the CSV.
fn write_xlsx(path: &Path, classifications: &[Classification]) -> Result<(), SessionError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (column, name) in (0u16..).zip(HEADER) {
        worksheet.write_string(0, column, name)?;
    }
    for (row, classification) in (1u32..).zip(classifications) {
        worksheet.write_string(row, 0, &classification.file)?;
        worksheet.write_string(row, 1, classification.classification.code())?;
        worksheet.write_string(row, 2, &classification.comments)?;
        worksheet.write_number(row, 3, classification.time_spent_secs)?;
        worksheet.write_string(row, 4, classification.timestamp.to_rfc3339())?;
    }

    workbook.save(path)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use std::{error::Error, fs};

    use chrono::{Local, TimeZone};

    use super::{export, Exported};
    use crate::session::{Category, Classification};

    #[test]
    fn test_export() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let now = Local
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
            .single()
            .ok_or("ambiguous time")?;
        let classifications = vec![
            Classification {
                file: "midi_files/a.mid".to_string(),
                classification: Category::Ok,
                comments: String::new(),
                time_spent_secs: 1.5,
                timestamp: now,
            },
            Classification {
                file: "midi_files/b.mid".to_string(),
                classification: Category::Ng4,
                comments: "busy, too busy".to_string(),
                time_spent_secs: 3.0,
                timestamp: now,
            },
        ];

        let exported = export(dir.path(), &classifications, now)?;

        assert_eq!(
            Exported {
                csv: dir.path().join("classifications_20240309_140507.csv"),
                xlsx: dir.path().join("classifications_20240309_140507.xlsx"),
                json: dir.path().join("classifications_20240309_140507.json"),
            },
            exported
        );

        let mut reader = csv::Reader::from_path(&exported.csv)?;
        assert_eq!(
            vec![
                "file",
                "classification",
                "comments",
                "time_spent_secs",
                "timestamp"
            ],
            reader.headers()?.iter().collect::<Vec<_>>()
        );
        let rows = reader
            .deserialize()
            .collect::<Result<Vec<Classification>, _>>()?;
        assert_eq!(classifications, rows);

        // A workbook is a zip archive.
        let xlsx = fs::read(&exported.xlsx)?;
        assert!(xlsx.starts_with(b"PK\x03\x04"));

        let json: Vec<Classification> =
            serde_json::from_str(&fs::read_to_string(&exported.json)?)?;
        assert_eq!(classifications, json);
        Ok(())
    }

    #[test]
    fn test_export_empty_writes_header() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;

        let exported = export(&dir.path().join("out"), &[], Local::now())?;

        assert_eq!(
            "file,classification,comments,time_spent_secs,timestamp\n",
            fs::read_to_string(exported.csv)?
        );
        assert!(exported.xlsx.is_file());
        assert_eq!("[]", fs::read_to_string(exported.json)?);
        Ok(())
    }
}
