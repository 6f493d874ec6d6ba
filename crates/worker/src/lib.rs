pub mod consumers;
