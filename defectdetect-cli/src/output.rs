//! Report rendering in text or JSON
//!
//! Command handlers build a payload and hand it to [`OutputWriter`]; the
//! writer picks the representation from `--output`.

use std::io::Write;

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Writes command payloads in the format chosen on the command line.
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    /// ```no_run
    /// use defectdetect_cli::cli::OutputFormat;
    /// use defectdetect_cli::output::OutputWriter;
    ///
    /// let writer = OutputWriter::new(OutputFormat::Json);
    /// assert_eq!(writer.format(), OutputFormat::Json);
    /// ```
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Selected output format.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Render to a locked stdout.
    pub fn render<T: Render + Serialize>(&self, payload: &T) -> Result<(), CliError> {
        let mut stdout = std::io::stdout().lock();
        self.render_to(payload, &mut stdout)?;
        stdout.flush()?;
        Ok(())
    }

    /// Render to any writer. JSON output is pretty-printed and newline-terminated.
    pub fn render_to<T: Render + Serialize>(
        &self,
        payload: &T,
        w: &mut dyn Write,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Text => payload.render_text(w)?,
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *w, payload)?;
                writeln!(w)?;
            }
        }
        Ok(())
    }
}

/// Human-readable form of a command payload.
pub trait Render {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()>;
}
