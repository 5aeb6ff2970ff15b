pub mod postgres;

pub use postgres::PostgresGateway;
