// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! The Verilator-backed implementation of [`DutModel`].

use std::collections::HashMap;

use libloading::Library;
use remora_harness::{DutModel, ModelError, PortDirection, TracePoint};
use snafu::{ResultExt, Whatever};

/// Verilator-defined types for C FFI.
pub mod types {
    /// From the Verilator documentation: "Data representing 'bit' of 1-8
    /// packed bits."
    pub type CData = u8;

    /// From the Verilator documentation: "Data representing 'bit' of 9-16
    /// packed bits"
    pub type SData = u16;

    /// From the Verilator documentation: "Data representing 'bit' of 17-32
    /// packed bits."
    pub type IData = u32;

    /// From the Verilator documentation: "Data representing 'bit' of 33-64
    /// packed bits."
    pub type QData = u64;
}

enum PortReader {
    CData(extern "C" fn(*mut libc::c_void) -> types::CData),
    SData(extern "C" fn(*mut libc::c_void) -> types::SData),
    IData(extern "C" fn(*mut libc::c_void) -> types::IData),
    QData(extern "C" fn(*mut libc::c_void) -> types::QData),
}

enum PortWriter {
    CData(extern "C" fn(*mut libc::c_void, types::CData)),
    SData(extern "C" fn(*mut libc::c_void, types::SData)),
    IData(extern "C" fn(*mut libc::c_void, types::IData)),
    QData(extern "C" fn(*mut libc::c_void, types::QData)),
}

struct PortAccess {
    read: PortReader,
    /// Only inputs and inouts have a setter in the generated shim.
    write: Option<PortWriter>,
}

/// A hardware model loaded from a Verilator-built dynamic library. See
/// [`VerilatorRuntime::create_model`](crate::VerilatorRuntime::create_model).
///
/// All port accessor symbols are resolved once at construction, so driving
/// and sampling ports on the hot path is just an indirect call. The model
/// borrows the library it was loaded from and must stay on one thread.
pub struct VerilatedDut<'ctx> {
    name: String,
    main: *mut libc::c_void,
    eval_main: extern "C" fn(*mut libc::c_void),
    delete_main: extern "C" fn(*mut libc::c_void),
    trace_points: Vec<TracePoint>,
    accessors: Vec<PortAccess>,
    index_by_name: HashMap<String, usize>,
    _library: &'ctx Library,
}

impl<'ctx> VerilatedDut<'ctx> {
    pub(crate) fn init_from(
        library: &'ctx Library,
        name: &str,
        ports: &[(&str, usize, usize, PortDirection)],
    ) -> Result<Self, Whatever> {
        macro_rules! resolve {
            ($symbol:expr, $type:ty) => {
                *unsafe { library.get::<$type>($symbol.as_bytes()) }
                    .whatever_context(format!(
                        "Failed to load symbol {} for module {}",
                        $symbol, name
                    ))?
            };
        }

        let new_main = resolve!(
            format!("ffi_new_V{name}"),
            extern "C" fn() -> *mut libc::c_void
        );
        let eval_main = resolve!(
            format!("ffi_V{name}_eval"),
            extern "C" fn(*mut libc::c_void)
        );
        let delete_main = resolve!(
            format!("ffi_delete_V{name}"),
            extern "C" fn(*mut libc::c_void)
        );

        let mut trace_points = vec![];
        let mut accessors = vec![];
        let mut index_by_name = HashMap::new();
        for (port, high, low, direction) in ports.iter().copied() {
            let width = (high - low + 1) as u32;

            let read_symbol = format!("ffi_V{name}_read_{port}");
            let read = if width <= 8 {
                PortReader::CData(resolve!(
                    read_symbol,
                    extern "C" fn(*mut libc::c_void) -> types::CData
                ))
            } else if width <= 16 {
                PortReader::SData(resolve!(
                    read_symbol,
                    extern "C" fn(*mut libc::c_void) -> types::SData
                ))
            } else if width <= 32 {
                PortReader::IData(resolve!(
                    read_symbol,
                    extern "C" fn(*mut libc::c_void) -> types::IData
                ))
            } else if width <= 64 {
                PortReader::QData(resolve!(
                    read_symbol,
                    extern "C" fn(*mut libc::c_void) -> types::QData
                ))
            } else {
                unreachable!(
                    "Port widths are validated when the library is built"
                )
            };

            let write = if matches!(
                direction,
                PortDirection::Input | PortDirection::Inout
            ) {
                let pin_symbol = format!("ffi_V{name}_pin_{port}");
                Some(if width <= 8 {
                    PortWriter::CData(resolve!(
                        pin_symbol,
                        extern "C" fn(*mut libc::c_void, types::CData)
                    ))
                } else if width <= 16 {
                    PortWriter::SData(resolve!(
                        pin_symbol,
                        extern "C" fn(*mut libc::c_void, types::SData)
                    ))
                } else if width <= 32 {
                    PortWriter::IData(resolve!(
                        pin_symbol,
                        extern "C" fn(*mut libc::c_void, types::IData)
                    ))
                } else {
                    PortWriter::QData(resolve!(
                        pin_symbol,
                        extern "C" fn(*mut libc::c_void, types::QData)
                    ))
                })
            } else {
                None
            };

            index_by_name.insert(port.to_string(), trace_points.len());
            trace_points.push(TracePoint::port(port, width, direction));
            accessors.push(PortAccess { read, write });
        }

        let main = new_main();

        Ok(Self {
            name: name.to_string(),
            main,
            eval_main,
            delete_main,
            trace_points,
            accessors,
            index_by_name,
            _library: library,
        })
    }
}

impl DutModel for VerilatedDut<'_> {
    fn top_name(&self) -> &str {
        &self.name
    }

    fn trace_points(&self) -> &[TracePoint] {
        &self.trace_points
    }

    fn eval(&mut self) {
        (self.eval_main)(self.main);
    }

    fn peek_point(&self, index: usize) -> u64 {
        match &self.accessors[index].read {
            PortReader::CData(read) => read(self.main) as u64,
            PortReader::SData(read) => read(self.main) as u64,
            PortReader::IData(read) => read(self.main) as u64,
            PortReader::QData(read) => read(self.main),
        }
    }

    fn pin(&mut self, port: &str, value: u64) -> Result<(), ModelError> {
        let Some(&index) = self.index_by_name.get(port) else {
            return Err(ModelError::NoSuchPort {
                top_module: self.name.clone(),
                port: port.to_string(),
            });
        };
        let point = &self.trace_points[index];
        if value & !point.mask() != 0 {
            return Err(ModelError::ValueTooWide {
                top_module: self.name.clone(),
                port: port.to_string(),
                width: point.width,
                value,
            });
        }
        match &self.accessors[index].write {
            None => Err(ModelError::NotAnInput {
                top_module: self.name.clone(),
                port: port.to_string(),
                direction: point.direction,
            }),
            Some(PortWriter::CData(write)) => {
                write(self.main, value as types::CData);
                Ok(())
            }
            Some(PortWriter::SData(write)) => {
                write(self.main, value as types::SData);
                Ok(())
            }
            Some(PortWriter::IData(write)) => {
                write(self.main, value as types::IData);
                Ok(())
            }
            Some(PortWriter::QData(write)) => {
                write(self.main, value);
                Ok(())
            }
        }
    }
}

impl Drop for VerilatedDut<'_> {
    fn drop(&mut self) {
        (self.delete_main)(self.main);
    }
}
