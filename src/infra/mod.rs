pub mod census_geography;
pub mod federal;
pub mod geocoder;
pub mod http_client;
