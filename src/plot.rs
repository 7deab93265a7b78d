//! Charts, drawn with gnuplot.

use std::{
    fmt::{self, Display},
    io::Write,
    path::{Path, PathBuf},
    process::Command,
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::{
    dashboard::HistogramBin,
    error::{LabError, LabResult},
    measure::CumulativePoint,
    model::QueueMetrics,
    service::Service,
    simulation::SimulationResult,
};

const PROBABILITIES_TEMPLATE: &str = include_str!("../templates/probabilities.gnuplot");
const CUMULATIVE_TEMPLATE: &str = include_str!("../templates/cumulative.gnuplot");
const SIMULATION_TEMPLATE: &str = include_str!("../templates/simulation.gnuplot");
const WAIT_HISTOGRAM_TEMPLATE: &str = include_str!("../templates/wait_histogram.gnuplot");

/// Output file type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotFormat {
    /// Raster image.
    #[default]
    Png,
    /// Printable document.
    Pdf,
}

impl PlotFormat {
    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            PlotFormat::Png => "png",
            PlotFormat::Pdf => "pdf",
        }
    }

    fn terminal(&self) -> &'static str {
        match self {
            PlotFormat::Png => "pngcairo size 1000,600",
            PlotFormat::Pdf => "pdfcairo size 10in,6in",
        }
    }
}

impl Display for PlotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for PlotFormat {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(PlotFormat::Png),
            "pdf" => Ok(PlotFormat::Pdf),
            other => Err(LabError::InvalidParameter(format!(
                "unknown plot format '{other}', expected png or pdf"
            ))),
        }
    }
}

/// Writes chart data next to the chart and runs gnuplot over it.
#[derive(Debug, Clone)]
pub struct Plotter {
    output_dir: PathBuf,
    format: PlotFormat,
    program: String,
}

impl Plotter {
    /// Create a new plotter
    ///
    /// # Arguments
    /// * `output_dir` - Directory where charts and their `.dat` files will be written
    /// * `format` - PNG or PDF
    pub fn new(output_dir: impl Into<PathBuf>, format: PlotFormat) -> Self {
        Self {
            output_dir: output_dir.into(),
            format,
            program: "gnuplot".to_string(),
        }
    }

    /// Run a different gnuplot executable.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Bar chart of `P(n)`. Missing probabilities are left out.
    pub fn probabilities(&self, name: &str, metrics: &QueueMetrics) -> LabResult<PathBuf> {
        let rows: Vec<String> = metrics
            .p
            .iter()
            .enumerate()
            .filter_map(|(n, p)| p.map(|p| format!("{n} {p}")))
            .collect();
        if rows.is_empty() {
            return Err(LabError::InsufficientData(format!(
                "'{name}' has no state probabilities"
            )));
        }

        self.draw(
            &format!("{}-probabilities", slug(name)),
            &format!("{name}: P(n)"),
            "# n p",
            &rows,
            PROBABILITIES_TEMPLATE,
        )
    }

    /// Step chart of cumulative arrivals and departures.
    pub fn cumulative(&self, name: &str, points: &[CumulativePoint]) -> LabResult<PathBuf> {
        if points.is_empty() {
            return Err(LabError::InsufficientData(format!(
                "'{name}' has no arrivals or departures"
            )));
        }
        let rows: Vec<String> = points
            .iter()
            .map(|p| format!("{} {} {}", p.time, p.arrivals, p.departures))
            .collect();

        self.draw(
            &format!("{}-cumulative", slug(name)),
            &format!("{name}: arrivals and departures"),
            "# time arrivals departures",
            &rows,
            CUMULATIVE_TEMPLATE,
        )
    }

    /// Queue length and utilisation over simulated time.
    pub fn simulation(&self, result: &SimulationResult) -> LabResult<PathBuf> {
        if result.chart.is_empty() {
            return Err(LabError::InsufficientData(
                "the simulation recorded no events".to_string(),
            ));
        }
        let rows: Vec<String> = result
            .chart
            .iter()
            .map(|p| format!("{} {} {}", p.time, p.queue_length, p.utilisation))
            .collect();

        self.draw(
            &format!("simulation-mm{}", result.config.servers()),
            &format!("Discrete simulation M/M/{}", result.config.servers()),
            "# time queue_length utilisation",
            &rows,
            SIMULATION_TEMPLATE,
        )
    }

    /// Histogram of waits on one queue.
    pub fn wait_histogram(&self, queue: &str, bins: &[HistogramBin]) -> LabResult<PathBuf> {
        if bins.is_empty() {
            return Err(LabError::InsufficientData("no waits to plot".to_string()));
        }
        let rows: Vec<String> = bins
            .iter()
            .map(|b| format!("\"{}\" {}", b.label, b.count))
            .collect();

        self.draw(
            &format!("{}-waits", slug(queue)),
            &format!("Waits on {queue}"),
            "# bin count",
            &rows,
            WAIT_HISTOGRAM_TEMPLATE,
        )
    }

    /// Every chart a service has data for.
    pub fn service(&self, service: &Service) -> LabResult<Vec<PathBuf>> {
        let mut charts = Vec::new();
        if service.metrics.p.iter().any(Option::is_some) {
            charts.push(self.probabilities(&service.name, &service.metrics)?);
        }
        if !service.cumulative.is_empty() {
            charts.push(self.cumulative(&service.name, &service.cumulative)?);
        }
        if charts.is_empty() {
            return Err(LabError::InsufficientData(format!(
                "service '{}' has nothing to plot",
                service.name
            )));
        }
        Ok(charts)
    }

    fn draw(
        &self,
        stem: &str,
        title: &str,
        header: &str,
        rows: &[String],
        template: &str,
    ) -> LabResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let output_path = self
            .output_dir
            .join(format!("{stem}.{}", self.format.extension()));
        let data_path = self.output_dir.join(format!("{stem}.dat"));

        let mut data_file = std::fs::File::create(&data_path)?;
        writeln!(data_file, "{header}")?;
        for row in rows {
            writeln!(data_file, "{row}")?;
        }
        data_file.flush()?;
        debug!(path = %data_path.display(), rows = rows.len(), "chart data written");

        let script = fill_template(template, self.format, &output_path, &data_path, title);

        // The script is deleted when `temp_script` drops.
        let mut temp_script = NamedTempFile::new()?;
        temp_script.write_all(script.as_bytes())?;
        temp_script.flush()?;

        let output = Command::new(&self.program)
            .arg(temp_script.path())
            .output()
            .map_err(|e| LabError::Plot(format!("could not run {}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(LabError::Plot(format!(
                "{} failed: {}",
                self.program,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        info!(path = %output_path.display(), "chart generated");
        Ok(output_path)
    }
}

fn fill_template(
    template: &str,
    format: PlotFormat,
    output_path: &Path,
    data_path: &Path,
    title: &str,
) -> String {
    template
        .replace("{{TERMINAL}}", format.terminal())
        .replace("{{OUTPUT_PATH}}", &gnuplot_escape(&output_path.display().to_string()))
        .replace("{{DATA_PATH}}", &gnuplot_escape(&data_path.display().to_string()))
        .replace("{{TITLE}}", &gnuplot_escape(title))
}

fn gnuplot_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Lowercase ASCII letters and digits, everything else collapsed to single dashes.
fn slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "chart".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::model::MmcModel;

    #[test]
    fn slugs() {
        assert_eq!(slug("Case study 1: Stable M/M/1"), "case-study-1-stable-m-m-1");
        assert_eq!(slug("Caixa"), "caixa");
        assert_eq!(slug("ÁÉ"), "chart");
    }

    #[test]
    fn template_is_filled() {
        let script = fill_template(
            CUMULATIVE_TEMPLATE,
            PlotFormat::Pdf,
            Path::new("/out/a.pdf"),
            Path::new("/out/a.dat"),
            "Say \"hi\"",
        );

        assert!(script.contains("set terminal pdfcairo"));
        assert!(script.contains("set output \"/out/a.pdf\""));
        assert!(script.contains("\"/out/a.dat\" using 1:2"));
        assert!(script.contains("set title \"Say \\\"hi\\\"\""));
        assert!(!script.contains("{{"));
    }

    #[test]
    fn data_is_kept_when_gnuplot_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let plotter = Plotter::new(dir.path(), PlotFormat::Png)
            .with_program("definitely-not-gnuplot-queue-lab");
        let metrics = MmcModel::builder().lambda(1.0).mu(2.0).build().unwrap().solve(3).unwrap();

        let result = plotter.probabilities("Caixa", &metrics);

        assert_matches!(result, Err(LabError::Plot(_)));
        let data = std::fs::read_to_string(dir.path().join("caixa-probabilities.dat")).unwrap();
        assert_eq!(data.lines().count(), 5);
        assert!(data.starts_with("# n p\n0 "));
    }

    #[test]
    fn formats_parse() {
        assert_eq!("PDF".parse::<PlotFormat>().unwrap(), PlotFormat::Pdf);
        assert!("svg".parse::<PlotFormat>().is_err());
    }
}
