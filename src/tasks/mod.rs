pub mod control_loop;
