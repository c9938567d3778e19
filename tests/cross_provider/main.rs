//! Provider round trips against mocked HTTP endpoints.

mod function_calling_e2e;
mod providers;
