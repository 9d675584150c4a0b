pub mod employee;
pub mod health;
pub mod notification;
pub mod org;
pub mod payroll_period;
pub mod payslip;
pub mod schema;
