pub mod check_scheduler;
