//! Tab separated reports of rates and quantification results.

use std::io::Write;

use crate::{
    error::Result,
    index::{CategoryId, Index},
    quantification::{rate::RateEstimates, Quantification},
};

fn category_label(index: &Index, cat: CategoryId) -> String {
    index
        .category_name(cat)
        .map_or_else(|| cat.to_string(), str::to_string)
}

/// One row per (category, simple|scaled):
/// `prefix split variant categoryName categoryId tp fp fn tn TPR FPR`.
pub fn write_rates<W>(out: &mut W, prefix: &str, split: &str, rates: &RateEstimates, index: &Index) -> Result<()>
where
    W: Write,
{
    for (cat, e) in &rates.estimates {
        let name = category_label(index, *cat);
        let t = e.table;
        for (variant, tpr, fpr) in [("simple", e.simple_tpr, e.simple_fpr), ("scaled", e.scaled_tpr, e.scaled_fpr)] {
            writeln!(
                out,
                "{prefix}\t{split}\t{variant}\t{name}\t{cat}\t{}\t{}\t{}\t{}\t{tpr}\t{fpr}",
                t.tp, t.fp, t.fn_, t.tn
            )?;
        }
    }
    Ok(())
}

/// One row per category: `name category id estimate`.
pub fn write_quantification<W>(out: &mut W, quantification: &Quantification, index: &Index) -> Result<()>
where
    W: Write,
{
    for (cat, value) in quantification.iter() {
        writeln!(out, "{}\t{}\t{cat}\t{value}", quantification.name, category_label(index, cat))?;
    }
    Ok(())
}

/// True prevalence of every category of `index`, for comparison with
/// estimates.
pub fn true_prevalence(index: &Index) -> Quantification {
    let mut out = Quantification::new("true");
    let n = index.document_count();
    for cat in index.category_ids() {
        let count = index.classification().count_of(cat);
        out.values.insert(cat, if n == 0 { 0.0 } else { count as f64 / n as f64 });
    }
    out
}
