//! Value Change Dump (IEEE 1364) output of the kernel's signals.
//!
//! Times are written in simulation steps, the timescale is one step of the
//! kernel's precision.

use std::io::Write;

use crate::error::TbResult;
use crate::sim_if::TimeUnit;
use crate::value::Logic;

pub struct VcdWriter<W: Write> {
    writer: W,
    // id code per object handle, None for objects not dumped
    ids: Vec<Option<String>>,
    current_time: Option<u64>,
}

impl<W: Write> VcdWriter<W> {
    pub fn new(writer: W) -> Self {
        VcdWriter {
            writer,
            ids: Vec::new(),
            current_time: None,
        }
    }

    pub fn started(&self) -> bool {
        self.current_time.is_some()
    }

    /// Declares `signals` as `(handle, name, initial value)` inside `scope`
    /// and dumps their initial values at time 0.
    pub fn write_header(
        &mut self,
        precision: TimeUnit,
        scope: &str,
        signals: &[(usize, &str, Logic)],
    ) -> TbResult<()> {
        writeln!(self.writer, "$version")?;
        writeln!(self.writer, "  {} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))?;
        writeln!(self.writer, "$end")?;
        writeln!(self.writer, "$timescale 1{} $end", precision)?;
        writeln!(self.writer, "$scope module {} $end", scope)?;
        for (index, &(handle, name, _)) in signals.iter().enumerate() {
            let code = id_code(index);
            writeln!(self.writer, "$var wire 1 {} {} $end", code, name)?;
            if self.ids.len() <= handle {
                self.ids.resize(handle + 1, None);
            }
            self.ids[handle] = Some(code);
        }
        writeln!(self.writer, "$upscope $end")?;
        writeln!(self.writer, "$enddefinitions $end")?;

        writeln!(self.writer, "#0")?;
        writeln!(self.writer, "$dumpvars")?;
        for &(handle, _, value) in signals {
            if let Some(Some(code)) = self.ids.get(handle) {
                writeln!(self.writer, "{}{}", value.as_char(), code)?;
            }
        }
        writeln!(self.writer, "$end")?;
        self.current_time = Some(0);
        Ok(())
    }

    /// Records a change of `handle` at `time` steps. Undeclared handles are ignored.
    pub fn record_change(&mut self, time: u64, handle: usize, value: Logic) -> TbResult<()> {
        let Some(Some(code)) = self.ids.get(handle) else {
            return Ok(());
        };
        if self.current_time != Some(time) {
            writeln!(self.writer, "#{}", time)?;
            self.current_time = Some(time);
        }
        writeln!(self.writer, "{}{}", value.as_char(), code)?;
        Ok(())
    }

    pub fn flush(&mut self) -> TbResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Printable identifier codes `!`, `"`, ... with more characters once the
/// 94 single-character codes are used up.
fn id_code(index: usize) -> String {
    let mut code = String::new();
    let mut idx = index;
    loop {
        code.push((b'!' + (idx % 94) as u8) as char);
        idx /= 94;
        if idx == 0 {
            break;
        }
        idx -= 1;
    }
    code
}
