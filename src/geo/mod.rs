pub mod nominatim;

pub use nominatim::{
    address_to_coordinates, coordinates_to_address, GeocoderConfig, NominatimGeocoder,
};
