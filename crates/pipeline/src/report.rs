//! Report Summarizer: feature means and a one-page PDF

use std::path::Path;

use fieldzones_algorithms::statistics::{column_means, grouped_means};
use fieldzones_core::{Feature, SampleSet, TimeWindow, ZoneAssignment};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use serde::Serialize;

use crate::error::{PipelineError, Result};

pub const REPORT_TITLE: &str = "Management Zones Report";

// A4 in points
const PAGE_WIDTH: f64 = 595.0;
const PAGE_HEIGHT: f64 = 842.0;
const MARGIN: f64 = 56.0;
const FONT_SIZE: f64 = 12.0;
const LINE_HEIGHT: f64 = 20.0;

/// Size and feature means of one zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneSummary {
    /// 1-based zone number as displayed
    pub zone: usize,
    pub count: usize,
    /// NaN (null in JSON) for an empty zone
    pub means: Vec<f64>,
}

/// Summary of a zoning run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub period: TimeWindow,
    pub zones: usize,
    pub sample_count: usize,
    pub features: Vec<Feature>,
    /// Mean of each feature over all samples, in feature order
    pub overall_means: Vec<f64>,
    pub zone_summaries: Vec<ZoneSummary>,
}

impl ReportSummary {
    pub fn build(window: &TimeWindow, samples: &SampleSet, assignment: &ZoneAssignment) -> Result<Self> {
        if samples.is_empty() {
            return Err(PipelineError::NoSamples);
        }
        if samples.len() != assignment.len() {
            return Err(PipelineError::InvalidParameter {
                name: "assignment",
                reason: format!("{} labels for {} samples", assignment.len(), samples.len()),
            });
        }

        let data = samples.feature_matrix();
        let overall_means = column_means(data.view());
        let zone_summaries = grouped_means(data.view(), assignment.labels(), assignment.k())?
            .into_iter()
            .map(|g| ZoneSummary {
                zone: g.label + 1,
                count: g.count,
                means: g.means,
            })
            .collect();

        Ok(Self {
            period: *window,
            zones: assignment.k(),
            sample_count: samples.len(),
            features: samples.features().to_vec(),
            overall_means,
            zone_summaries,
        })
    }

    /// Report text, one entry per line.
    pub fn render_lines(&self) -> Vec<String> {
        let mut lines = vec![
            REPORT_TITLE.to_string(),
            format!("Period: {}", self.period),
            format!("Number of zones: {}", self.zones),
            "Overall feature means:".to_string(),
        ];
        lines.extend(
            self.features
                .iter()
                .zip(&self.overall_means)
                .map(|(f, &m)| format!("{}: {}", f.label(), f.format_value(m))),
        );
        lines.push(format!("Samples: {}", self.sample_count));

        for z in &self.zone_summaries {
            if z.count == 0 {
                lines.push(format!("Zone {} (n=0): no samples", z.zone));
                continue;
            }
            let means: Vec<String> = self
                .features
                .iter()
                .zip(&z.means)
                .map(|(f, &m)| format!("{} {}", f.label(), f.format_value(m)))
                .collect();
            lines.push(format!("Zone {} (n={}): {}", z.zone, z.count, means.join(", ")));
        }
        lines
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PipelineError::Output(e.to_string()))
    }

    /// Single A4 page, Helvetica 12 pt, title centred.
    pub fn render_pdf(&self) -> Result<Vec<u8>> {
        let lines = self.render_lines();
        let mut operations = Vec::new();
        let mut y = PAGE_HEIGHT - MARGIN;

        for (i, line) in lines.iter().enumerate() {
            let x = if i == 0 {
                (PAGE_WIDTH - text_width(line, FONT_SIZE)) / 2.0
            } else {
                MARGIN
            };
            operations.extend(text_at(line, x, y));
            y -= LINE_HEIGHT;
            // Blank line after the title and after the zone count
            if i == 0 || i == 2 {
                y -= LINE_HEIGHT;
            }
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let content = Content { operations };
        let encoded = content.encode().map_err(pdf_error)?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), Object::Real(PAGE_WIDTH as f32), Object::Real(PAGE_HEIGHT as f32)],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut buf = Vec::new();
        doc.save_to(&mut buf).map_err(|e| PipelineError::Output(format!("writing PDF: {e}")))?;
        Ok(buf)
    }

    pub fn write_pdf(&self, path: &Path) -> Result<()> {
        let bytes = self.render_pdf()?;
        std::fs::write(path, bytes).map_err(|e| PipelineError::Output(format!("{}: {}", path.display(), e)))
    }
}

fn pdf_error(e: lopdf::Error) -> PipelineError {
    PipelineError::Output(format!("building PDF: {e}"))
}

fn text_at(text: &str, x: f64, y: f64) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), Object::Real(FONT_SIZE as f32)]),
        Operation::new("Td", vec![Object::Real(x as f32), Object::Real(y as f32)]),
        Operation::new("Tj", vec![Object::string_literal(text)]),
        Operation::new("ET", vec![]),
    ]
}

/// Approximate Helvetica advance width of `text` in points.
fn text_width(text: &str, size: f64) -> f64 {
    let units: f64 = text
        .chars()
        .map(|c| match c {
            ' ' | 'i' | 'j' | 'l' | '.' | ',' | ':' | '(' | ')' | 'f' | 't' | 'I' => 278.0,
            'm' | 'M' | 'W' => 833.0,
            'w' => 722.0,
            'r' => 333.0,
            'A'..='Z' => 667.0,
            _ => 556.0,
        })
        .sum();
    units * size / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldzones_core::SamplePoint;

    fn window() -> TimeWindow {
        TimeWindow::parse("2025-01-01", "2025-03-31").unwrap()
    }

    fn summary() -> ReportSummary {
        let points = vec![
            SamplePoint::new(0.0, 0.0, vec![1.0, 1.0, 1.0, 100.0]),
            SamplePoint::new(0.0, 0.0, vec![3.0, 3.0, 3.0, 300.0]),
        ];
        let samples = SampleSet::new(Feature::ALL.to_vec(), points).unwrap();
        let assignment = ZoneAssignment::new(2, vec![0, 1]).unwrap();
        ReportSummary::build(&window(), &samples, &assignment).unwrap()
    }

    #[test]
    fn overall_means_and_layout() {
        let s = summary();
        assert_eq!(s.overall_means, vec![2.0, 2.0, 2.0, 200.0]);

        let lines = s.render_lines();
        assert_eq!(
            &lines[..8],
            &[
                "Management Zones Report",
                "Period: 2025-01-01 to 2025-03-31",
                "Number of zones: 2",
                "Overall feature means:",
                "NDVI: 2.000",
                "NDRE: 2.000",
                "SBI: 2.000",
                "Altitude: 200.00 m",
            ]
        );
        assert_eq!(lines[8], "Samples: 2");
        assert_eq!(lines[9], "Zone 1 (n=1): NDVI 1.000, NDRE 1.000, SBI 1.000, Altitude 100.00 m");
    }

    #[test]
    fn empty_zone_line() {
        let points = vec![
            SamplePoint::new(0.0, 0.0, vec![0.5]),
            SamplePoint::new(0.0, 0.0, vec![0.7]),
        ];
        let samples = SampleSet::new(vec![Feature::Ndvi], points).unwrap();
        let assignment = ZoneAssignment::new(3, vec![0, 0]).unwrap();
        let s = ReportSummary::build(&window(), &samples, &assignment).unwrap();

        let lines = s.render_lines();
        assert_eq!(lines.last().unwrap(), "Zone 3 (n=0): no samples");
        let json: serde_json::Value = serde_json::from_str(&s.to_json().unwrap()).unwrap();
        assert!(json["zone_summaries"][2]["means"][0].is_null());
        assert_eq!(json["period"]["start"], "2025-01-01");
    }

    #[test]
    fn pdf_has_one_page() {
        let bytes = summary().render_pdf().unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn writes_pdf_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        summary().write_pdf(&path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
