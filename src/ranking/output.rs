//! Per-step output of a ranking simulation.

use std::io::Write;

use serde::Serialize;

use crate::{
    error::Result,
    evaluation::{ContingencyTable, ContingencyTableSet, Measure},
    index::{CategoryId, DocId},
};

/// Receives the evaluation after every ranking step.
pub trait StepSink {
    /// `step` 0 carries the initial evaluation and no document.
    fn step(&mut self, step: usize, doc: Option<DocId>, tables: &ContingencyTableSet, value: f64) -> Result<()>;

    /// Called once after the last step with the per-step measure values.
    fn finish(&mut self, _measures: &[f64]) -> Result<()> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StepSink for NullSink {
    fn step(&mut self, _step: usize, _doc: Option<DocId>, _tables: &ContingencyTableSet, _value: f64) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct CategoryReport {
    category: CategoryId,
    #[serde(flatten)]
    table: ContingencyTable,
    measure: f64,
}

#[derive(Serialize)]
struct StepReport {
    step: usize,
    document: Option<DocId>,
    value: f64,
    measure: String,
    categories: Vec<CategoryReport>,
    global: ContingencyTable,
    micro: f64,
    #[serde(rename = "macro")]
    macro_value: f64,
}

/// Writes one JSON evaluation report per line.
pub struct FullReportWriter<W> {
    out: W,
    measure: Measure,
}

impl<W> FullReportWriter<W>
where
    W: Write,
{
    pub fn new(out: W, measure: Measure) -> Self {
        Self { out, measure }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W> StepSink for FullReportWriter<W>
where
    W: Write,
{
    fn step(&mut self, step: usize, doc: Option<DocId>, tables: &ContingencyTableSet, value: f64) -> Result<()> {
        let report = StepReport {
            step,
            document: doc,
            value,
            measure: self.measure.to_string(),
            categories: tables
                .iter()
                .map(|(category, table)| CategoryReport {
                    category,
                    table: *table,
                    measure: table.measure(&self.measure),
                })
                .collect(),
            global: *tables.global(),
            micro: tables.micro_measure(&self.measure),
            macro_value: tables.macro_measure(&self.measure),
        };
        serde_json::to_writer(&mut self.out, &report)?;
        writeln!(self.out)?;
        Ok(())
    }

    fn finish(&mut self, _measures: &[f64]) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Writes only the measure array, as its bracketed literal, once finished.
pub struct LightWriter<W> {
    out: W,
}

impl<W> LightWriter<W>
where
    W: Write,
{
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W> StepSink for LightWriter<W>
where
    W: Write,
{
    fn step(&mut self, _step: usize, _doc: Option<DocId>, _tables: &ContingencyTableSet, _value: f64) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self, measures: &[f64]) -> Result<()> {
        writeln!(self.out, "{measures:?}")?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> ContingencyTableSet {
        let mut set = ContingencyTableSet::new("t");
        set.insert(CategoryId(0), ContingencyTable::new(1, 1, 0, 2));
        set
    }

    #[test]
    fn full_report_is_one_json_object_per_line() {
        let mut sink = FullReportWriter::new(Vec::new(), Measure::F1);
        sink.step(0, None, &tables(), 0.5).unwrap();
        sink.step(1, Some(DocId(3)), &tables(), 0.75).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["document"], 3);
        assert_eq!(lines[0]["categories"][0]["fp"], 1);
        assert_eq!(lines[0]["measure"], "F1");
    }

    #[test]
    fn light_output_is_the_bracketed_array() {
        let mut sink = LightWriter::new(Vec::new());
        sink.step(0, None, &tables(), 0.5).unwrap();
        sink.finish(&[0.5, 0.75, 1.0]).unwrap();
        assert_eq!(String::from_utf8(sink.into_inner()).unwrap(), "[0.5, 0.75, 1.0]\n");
    }
}
