//! Identity verification and PLD screening orchestration for a multi-tenant
//! real estate CRM: credential parsing, provider gateway, staff validation
//! state machine, evidence storage, and the anonymous self-service session.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
