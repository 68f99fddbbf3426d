//! Pending force terms, prefix code and external arguments.
//!
//! Everything here is host-side bookkeeping that lives only until the kernel
//! is built; the build consumes the registry by value.

use std::sync::Arc;

use bonded_codegen::{CodegenError, MAX_GROUPS, external_arg_name, term_arity};

use crate::error::{BondedError, Result};

/// One registered force term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForceTerm {
    pub tuples: Vec<Vec<u32>>,
    pub expression: String,
    pub group: u32,
    pub arity: usize,
}

/// A caller-owned device buffer exposed to expression snippets.
#[derive(Debug)]
pub struct ExternalArgument<Buf> {
    pub buffer: Arc<Buf>,
    pub type_name: String,
    /// Synthesized parameter name, e.g. `customArg2`.
    pub name: String,
}

#[derive(Debug)]
pub struct Registry<Buf> {
    num_atoms: usize,
    terms: Vec<ForceTerm>,
    prefix: Vec<String>,
    arguments: Vec<ExternalArgument<Buf>>,
}

impl<Buf> Registry<Buf> {
    pub fn new(num_atoms: usize) -> Self {
        Self {
            num_atoms,
            terms: Vec::new(),
            prefix: Vec::new(),
            arguments: Vec::new(),
        }
    }

    /// Validate and record a term. Returns `false` for an empty tuple list,
    /// which registers nothing.
    pub fn add_interaction(
        &mut self,
        tuples: Vec<Vec<u32>>,
        expression: impl Into<String>,
        group: u32,
    ) -> Result<bool> {
        if tuples.is_empty() {
            return Ok(false);
        }
        if group >= MAX_GROUPS {
            return Err(BondedError::GroupOutOfRange(group));
        }
        let arity = term_arity(&tuples).map_err(|e| match e {
            CodegenError::RaggedTuple {
                tuple,
                expected,
                found,
            } => BondedError::InconsistentArity {
                tuple,
                expected,
                found,
            },
            other => BondedError::Configuration(other.to_string()),
        })?;

        for (tuple, atoms) in tuples.iter().enumerate() {
            if let Some(&index) = atoms.iter().find(|&&a| a as usize >= self.num_atoms) {
                return Err(BondedError::AtomIndexOutOfRange {
                    tuple,
                    index,
                    num_atoms: self.num_atoms,
                });
            }
        }

        let expression = expression.into();
        if expression.trim().is_empty() {
            return Err(BondedError::Configuration(
                "force expression is empty".to_string(),
            ));
        }

        self.terms.push(ForceTerm {
            tuples,
            expression,
            group,
            arity,
        });
        Ok(true)
    }

    /// Register an external argument and return its parameter name.
    ///
    /// The k-th call (1-based) returns `customArgk`.
    pub fn add_argument(&mut self, buffer: Arc<Buf>, type_name: &str) -> Result<String> {
        bonded_codegen::validate_type_name(type_name)
            .map_err(|e| BondedError::Configuration(e.to_string()))?;
        let name = external_arg_name(self.arguments.len() + 1);
        self.arguments.push(ExternalArgument {
            buffer,
            type_name: type_name.to_string(),
            name: name.clone(),
        });
        Ok(name)
    }

    /// Append raw code emitted ahead of the kernel body.
    pub fn add_prefix_code(&mut self, source: impl Into<String>) {
        self.prefix.push(source.into());
    }

    pub fn terms(&self) -> &[ForceTerm] {
        &self.terms
    }

    pub fn prefix(&self) -> &[String] {
        &self.prefix
    }

    pub fn arguments(&self) -> &[ExternalArgument<Buf>] {
        &self.arguments
    }

    pub fn num_atoms(&self) -> usize {
        self.num_atoms
    }

    /// Largest tuple count over every term, 0 when nothing is registered.
    pub fn max_tuple_count(&self) -> usize {
        self.terms.iter().map(|t| t.tuples.len()).max().unwrap_or(0)
    }

    pub fn into_parts(self) -> (Vec<ForceTerm>, Vec<String>, Vec<ExternalArgument<Buf>>) {
        (self.terms, self.prefix, self.arguments)
    }
}
