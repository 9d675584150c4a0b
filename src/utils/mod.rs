pub mod db_utils;
pub mod pdf;
pub mod response;
