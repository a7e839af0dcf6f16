pub mod agent_repository;
pub mod appointment_repository;
pub mod channel_adapter;
pub mod conversation_repository;
pub mod distributed_lock;
pub mod followup_repository;
pub mod job_store;
pub mod reminder_repository;
pub mod send_counter_repository;
pub mod summary_repository;
pub mod task_spawner;
pub mod template_catalog;
pub mod text_generator;
pub mod time_service;
pub mod webhook_sender;
