//! Builder that turns registered terms into a [`KernelProgram`].

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{CodegenError, Result};
use crate::generator::TermBlock;
use crate::ir::{
    ENERGY_BUFFER, FORCE_BUFFER, Fragment, GROUP_MASK, KernelParam, KernelProgram, POSITIONS,
    ParamKind,
};
use crate::packer::Window;

/// Name of the `k`-th external argument buffer (1-based).
pub fn external_arg_name(k: usize) -> String {
    format!("customArg{k}")
}

/// Check that `name` is a plain identifier: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid && name != "_" {
        Ok(())
    } else {
        Err(CodegenError::InvalidIdentifier(name.to_string()))
    }
}

/// Check that `type_name` looks like a WGSL type such as `f32` or `vec2<f32>`.
pub fn validate_type_name(type_name: &str) -> Result<()> {
    let mut depth = 0i32;
    for c in type_name.chars() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth < 0 {
                    break;
                }
            }
            ',' | ' ' => {}
            c if c.is_ascii_alphanumeric() || c == '_' => {}
            _ => return Err(CodegenError::InvalidTypeName(type_name.to_string())),
        }
    }
    let starts_ok = type_name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic());
    if depth == 0 && starts_ok {
        Ok(())
    } else {
        Err(CodegenError::InvalidTypeName(type_name.to_string()))
    }
}

/// Incrementally assembles a fused kernel.
///
/// Binding order is fixed: force accumulator, energy accumulator, positions,
/// group mask, then every term's index buffers in registration order, then
/// external arguments in registration order.
#[derive(Debug)]
pub struct KernelAssembler {
    entry_point: String,
    prefix: Vec<String>,
    defines: IndexMap<String, String>,
    terms: Vec<TermBlock>,
    index_params: Vec<KernelParam>,
    externals: Vec<KernelParam>,
}

impl KernelAssembler {
    pub fn new(entry_point: impl Into<String>) -> Result<Self> {
        let entry_point = entry_point.into();
        validate_identifier(&entry_point)?;
        Ok(Self {
            entry_point,
            prefix: Vec::new(),
            defines: IndexMap::new(),
            terms: Vec::new(),
            index_params: Vec::new(),
            externals: Vec::new(),
        })
    }

    /// Append raw module-scope code ahead of the generated helpers.
    pub fn prefix(&mut self, code: impl Into<String>) -> &mut Self {
        let mut code = code.into();
        if !code.is_empty() && !code.ends_with('\n') {
            code.push('\n');
        }
        self.prefix.push(code);
        self
    }

    /// Set a compile-time constant; a later value for the same name wins.
    pub fn define(&mut self, name: &str, value: impl Into<String>) -> Result<&mut Self> {
        validate_identifier(name)?;
        self.defines.insert(name.to_string(), value.into());
        Ok(self)
    }

    /// Add one term and its index buffers. Returns the term's index.
    pub fn add_term(
        &mut self,
        group: u32,
        tuple_count: u32,
        windows: &[Window],
        expression: impl Into<String>,
    ) -> Result<usize> {
        let term = self.terms.len();
        let block = TermBlock::new(term, group, tuple_count, windows, expression)?;
        for load in &block.loads {
            self.index_params.push(KernelParam::new(
                load.param.clone(),
                ParamKind::AtomIndices(load.window.width),
            ));
        }
        debug!(
            term,
            group,
            tuple_count,
            buffers = block.loads.len(),
            "added term block"
        );
        self.terms.push(block);
        Ok(term)
    }

    /// Declare an external argument buffer. Returns the name snippets use.
    pub fn external(&mut self, type_name: &str) -> Result<String> {
        validate_type_name(type_name)?;
        let name = external_arg_name(self.externals.len() + 1);
        self.externals.push(KernelParam::new(
            name.clone(),
            ParamKind::External {
                type_name: type_name.to_string(),
            },
        ));
        Ok(name)
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn finish(self) -> KernelProgram {
        let mut params = vec![
            KernelParam::new(FORCE_BUFFER, ParamKind::ForceAccumulator),
            KernelParam::new(ENERGY_BUFFER, ParamKind::EnergyAccumulator),
            KernelParam::new(POSITIONS, ParamKind::Positions),
            KernelParam::new(GROUP_MASK, ParamKind::GroupMask),
        ];
        params.extend(self.index_params);
        params.extend(self.externals);

        let mut fragments: Vec<Fragment> = self.prefix.into_iter().map(Fragment::Prefix).collect();
        fragments.push(Fragment::Support);
        fragments.push(Fragment::Signature);
        fragments.push(Fragment::EntryOpen {
            entry_point: self.entry_point.clone(),
        });
        fragments.extend(self.terms.into_iter().map(Fragment::Term));
        fragments.push(Fragment::Epilogue);

        KernelProgram {
            entry_point: self.entry_point,
            defines: self.defines,
            params,
            fragments,
        }
    }
}
