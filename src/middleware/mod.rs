pub mod api_access;
