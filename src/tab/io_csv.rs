// Primitives for reading CSV files.

use std::fs::File;

use crate::tab::{io_common::make_default_id, *};

pub fn read_csv_ranking(path: &str, cfs: &FileSource) -> TabResult<Vec<ParsedBallot>> {
    let default_id = make_default_id(path);

    let id_idx_o = cfs.id_column_index_int()?;
    let choices_start_col = cfs.first_vote_column_index()?;
    let weight_idx_o = cfs.weight_column_index_int()?;

    let mut res: Vec<ParsedBallot> = Vec::new();
    let (records, row_offset) = get_records(path, cfs)?;

    for (idx, line_r) in records.enumerate() {
        let lineno = idx + row_offset;
        let line = line_r.context(CsvLineParseSnafu {})?;
        let id = if let Some(id_idx) = id_idx_o {
            line.get(id_idx)
                .context(CsvLineToShortSnafu { lineno })?
                .to_string()
        } else {
            default_id(lineno)
        };

        let weight: Option<f64> = match weight_idx_o {
            Some(weight_idx) => {
                let cell = line
                    .get(weight_idx)
                    .context(CsvLineToShortSnafu { lineno })?
                    .trim();
                if cell.is_empty() {
                    None
                } else {
                    let w = cell.parse::<f64>().ok().context(CsvWeightParseSnafu {
                        lineno,
                        value: cell,
                    })?;
                    Some(w)
                }
            }
            None => None,
        };

        // The id and weight columns are never rankings, even when they come
        // after the first ranking column.
        let choices: Vec<String> = line
            .iter()
            .enumerate()
            .skip(choices_start_col)
            .filter(|(col, _)| Some(*col) != id_idx_o && Some(*col) != weight_idx_o)
            .map(|(_, s)| s.trim().to_string())
            .collect();
        debug!("read_csv_ranking: lineno: {:?} row: {:?}", lineno, &choices);

        res.push(ParsedBallot {
            id: Some(id),
            weight,
            choices,
        });
    }
    Ok(res)
}

fn get_records(
    path: &str,
    cfs: &FileSource,
) -> TabResult<(csv::StringRecordsIntoIter<File>, usize)> {
    let first_row = cfs.first_vote_row_index()?;
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    let mut records = rdr.into_records();
    // The index starts at 1 to respect most conventions in the excel world
    for _ in 1..first_row {
        _ = records.next();
    }
    Ok((records, first_row))
}
