use std::marker::PhantomData;
use std::path::PathBuf;

use csv_core::WriteResult;

#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Format {
    Table,
    Jsonl,
    Csv,
}

#[derive(clap::Parser)]
#[group(id = "output::Args")]
pub struct Args {
    /// Write to this file instead of the terminal.
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
    #[arg(long, short='f', value_enum, default_value_t = Format::Table)]
    format: Format,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not open the specified output file at {1:?}")]
    OpenOutputFile(#[source] std::io::Error, PathBuf),
    #[error("could not write data to the output file at {1:?}")]
    WriteFile(#[source] std::io::Error, PathBuf),
    #[error("could not write data to the terminal")]
    WriteStdout(#[source] std::io::Error),
    #[error("could not serialize the record to JSON")]
    SerializeJson(#[source] serde_json::Error),
    #[error("could not encode a CSV field")]
    EncodeCsv,
}

/// A single line of command output.
///
/// The table and CSV formats show [`Record::cells`] under [`Record::COLUMNS`]. JSON lines carry
/// the serialized record, which may hold more detail than the cells.
pub trait Record: serde::Serialize {
    const COLUMNS: &'static [&'static str];
    fn cells(&self) -> Vec<String>;
}

impl Args {
    pub fn to_output<R: Record>(self) -> Result<Output<R>, Error> {
        let sink = match &self.output {
            None => Box::new(std::io::stdout().lock()) as Box<_>,
            Some(path) => Box::new(
                std::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .map_err(|e| Error::OpenOutputFile(e, path.clone()))?,
            ) as Box<_>,
        };
        let style = match self.format {
            Format::Table => {
                let mut table = comfy_table::Table::new();
                table.set_content_arrangement(comfy_table::ContentArrangement::Dynamic);
                table.set_header(R::COLUMNS.to_vec());
                Style::Table(table)
            }
            Format::Jsonl => Style::Jsonl,
            Format::Csv => Style::Csv,
        };
        let mut output = Output { path: self.output, sink, style, record: PhantomData };
        if let Style::Csv = output.style {
            output.write_csv_line(R::COLUMNS)?;
        }
        Ok(output)
    }
}

pub struct Output<R> {
    path: Option<PathBuf>,
    sink: Box<dyn std::io::Write>,
    style: Style,
    record: PhantomData<fn(&R)>,
}

enum Style {
    Csv,
    // Rows are collected so that column widths fit the widest cell.
    Table(comfy_table::Table),
    Jsonl,
}

impl<R: Record> Output<R> {
    pub fn write(&mut self, record: &R) -> Result<(), Error> {
        match &mut self.style {
            Style::Csv => self.write_csv_line(&record.cells()),
            Style::Table(table) => {
                table.add_row(record.cells());
                Ok(())
            }
            Style::Jsonl => {
                serde_json::to_writer(&mut self.sink, record).map_err(Error::SerializeJson)?;
                writeln!(self.sink).map_err(|e| self.io_error(e))
            }
        }
    }

    pub fn commit(mut self) -> Result<(), Error> {
        if let Style::Table(table) = &self.style {
            let rendered = format!("{table}\n");
            self.sink.write_all(rendered.as_bytes()).map_err(|e| self.io_error(e))?;
        }
        self.sink.flush().map_err(|e| self.io_error(e))
    }
}

impl<R> Output<R> {
    fn write_csv_line<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<(), Error> {
        // Worst case every byte is a quote, plus the surrounding quotes.
        let longest = fields.iter().map(|f| f.as_ref().len()).max().unwrap_or(0);
        let mut buffer = vec![0; 2 + 2 * longest];
        let mut writer = csv_core::Writer::new();
        let mut line = Vec::new();
        for (idx, field) in fields.iter().enumerate() {
            if idx != 0 {
                let (WriteResult::InputEmpty, n) = writer.delimiter(&mut buffer) else {
                    return Err(Error::EncodeCsv);
                };
                line.extend_from_slice(&buffer[..n]);
            }
            let input = field.as_ref().as_bytes();
            let (WriteResult::InputEmpty, _, n) = writer.field(input, &mut buffer) else {
                return Err(Error::EncodeCsv);
            };
            line.extend_from_slice(&buffer[..n]);
        }
        let (WriteResult::InputEmpty, n) = writer.terminator(&mut buffer) else {
            return Err(Error::EncodeCsv);
        };
        line.extend_from_slice(&buffer[..n]);
        self.sink.write_all(&line).map_err(|e| self.io_error(e))
    }

    fn io_error(&self, e: std::io::Error) -> Error {
        match &self.path {
            None => Error::WriteStdout(e),
            Some(path) => Error::WriteFile(e, path.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Serialize)]
    struct Room {
        unique_id: &'static str,
        name: &'static str,
    }

    impl Record for Room {
        const COLUMNS: &'static [&'static str] = &["Unique ID", "Name"];
        fn cells(&self) -> Vec<String> {
            vec![self.unique_id.into(), self.name.into()]
        }
    }

    fn render(format: Format, rooms: &[Room]) -> String {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");
        let args = Args { output: Some(path.clone()), format };
        let mut output = args.to_output::<Room>().unwrap();
        for room in rooms {
            output.write(room).unwrap();
        }
        output.commit().unwrap();
        std::fs::read_to_string(path).unwrap()
    }

    const LIVING_ROOM: Room = Room { unique_id: "iqtec-r1", name: "Living room, upstairs" };

    #[test]
    fn csv_quotes_fields() {
        assert_eq!(
            render(Format::Csv, &[LIVING_ROOM]),
            "Unique ID,Name\niqtec-r1,\"Living room, upstairs\"\n"
        );
    }

    #[test]
    fn csv_without_records_has_headers() {
        assert_eq!(render(Format::Csv, &[]), "Unique ID,Name\n");
    }

    #[test]
    fn jsonl_carries_the_whole_record() {
        assert_eq!(
            render(Format::Jsonl, &[LIVING_ROOM]),
            "{\"unique_id\":\"iqtec-r1\",\"name\":\"Living room, upstairs\"}\n"
        );
    }

    #[test]
    fn table_contains_rows() {
        let table = render(Format::Table, &[LIVING_ROOM]);
        assert!(table.contains("Unique ID"));
        assert!(table.contains("iqtec-r1"));
    }
}
