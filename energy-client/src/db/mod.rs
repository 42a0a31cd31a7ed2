pub mod energy_site_queries;
