//! The legacy line-oriented "hydra" text format.
//!
//! A request is one header line followed by one pick per line; the
//! response echoes the header extended with the error statistics and
//! rewrites each pick line with its residual, distance, azimuth, weight,
//! and importance. Blank location and channel codes are carried as "--".

use crate::error::{LocatorError, Result};
use crate::geo;
use crate::io::request::{InputPick, LocationRequest, LocationResult, Site, SourceInfo};
use crate::models::pick::AuthorType;

fn placeholder(text: &str) -> &str {
    if text.is_empty() {
        "--"
    } else {
        text
    }
}

fn unplaceholder(token: &str) -> String {
    if token == "--" {
        String::new()
    } else {
        token.to_string()
    }
}

fn parse_bool(token: &str) -> Result<bool> {
    match token {
        "true" | "T" | "t" | "1" => Ok(true),
        "false" | "F" | "f" | "0" => Ok(false),
        other => Err(LocatorError::BadInput(format!("bad boolean '{other}'"))),
    }
}

fn parse_f64(token: &str, what: &str) -> Result<f64> {
    token
        .parse()
        .map_err(|_| LocatorError::BadInput(format!("bad {what} '{token}'")))
}

/// Parse a hydra request: the header line then one pick per line.
///
/// Header fields: origin date, origin time, latitude, longitude, depth,
/// held-location, held-depth, bayesian-depth flag, bayesian depth,
/// bayesian spread, use-decorrelation.
///
/// Pick fields: station, channel, network, location, station latitude,
/// longitude, elevation, arrival time (epoch seconds), use flag, phase,
/// affinity, quality, agency, author, author-type code.
pub fn parse_request(text: &str) -> Result<LocationRequest> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| LocatorError::BadInput("empty hydra input".into()))?;

    let tokens: Vec<&str> = header.split_whitespace().collect();
    if tokens.len() < 11 {
        return Err(LocatorError::BadInput(format!(
            "hydra header has {} fields, expected 11",
            tokens.len()
        )));
    }

    let origin_text = format!("{} {}", tokens[0], tokens[1]);
    let origin_seconds = geo::parse_origin_time(&origin_text)
        .ok_or_else(|| LocatorError::BadInput(format!("bad origin time '{origin_text}'")))?;

    let mut request = LocationRequest {
        source_origin_time: geo::seconds_to_millis(origin_seconds),
        source_latitude: parse_f64(tokens[2], "latitude")?,
        source_longitude: parse_f64(tokens[3], "longitude")?,
        source_depth: parse_f64(tokens[4], "depth")?,
        is_location_new: false,
        is_location_held: parse_bool(tokens[5])?,
        is_depth_held: parse_bool(tokens[6])?,
        is_bayesian_depth: parse_bool(tokens[7])?,
        bayesian_depth: parse_f64(tokens[8], "bayesian depth")?,
        bayesian_spread: parse_f64(tokens[9], "bayesian spread")?,
        use_rstt: false,
        use_svd: parse_bool(tokens[10])?,
        reassess_initial_phase_ids: true,
        earth_model: "ak135".to_string(),
        input_data: Vec::new(),
    };

    for line in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 15 {
            return Err(LocatorError::BadInput(format!(
                "hydra pick line has {} fields, expected 15",
                fields.len()
            )));
        }
        let arrival_seconds = parse_f64(fields[7], "arrival time")?;
        let author_code: u8 = fields[14]
            .parse()
            .map_err(|_| LocatorError::BadInput(format!("bad author type '{}'", fields[14])))?;

        request.input_data.push(InputPick {
            id: String::new(),
            site: Site {
                station: fields[0].to_string(),
                channel: unplaceholder(fields[1]),
                network: fields[2].to_string(),
                location: unplaceholder(fields[3]),
                latitude: parse_f64(fields[4], "station latitude")?,
                longitude: parse_f64(fields[5], "station longitude")?,
                elevation: parse_f64(fields[6], "station elevation")?,
            },
            source: SourceInfo {
                agency_id: unplaceholder(fields[12]),
                author: unplaceholder(fields[13]),
                author_type: AuthorType::from_code(author_code).as_str().to_string(),
            },
            time: geo::seconds_to_millis(arrival_seconds),
            located_phase: unplaceholder(fields[9]),
            associated_phase: unplaceholder(fields[9]),
            use_flag: parse_bool(fields[8])?,
            quality: parse_f64(fields[11], "quality")?,
            affinity: parse_f64(fields[10], "affinity")?,
        });
    }

    Ok(request)
}

/// Write a request back out in hydra form.
pub fn write_request(request: &LocationRequest) -> String {
    let mut out = String::new();
    let origin = geo::format_origin_time(geo::millis_to_seconds(request.source_origin_time));
    out.push_str(&format!(
        "{} {:8.4} {:9.4} {:6.2} {:5} {:5} {:5} {:5.1} {:5.1} {:5}\n",
        origin,
        request.source_latitude,
        request.source_longitude,
        request.source_depth,
        request.is_location_held,
        request.is_depth_held,
        request.is_bayesian_depth,
        request.bayesian_depth,
        request.bayesian_spread,
        request.use_svd,
    ));
    for pick in &request.input_data {
        out.push_str(&format!(
            "{:<5} {:<3} {:<2} {:<2} {:8.4} {:9.4} {:6.3} {:14.3} {} {:<8} {:4.2} {:4.2} {:<8} {:<8} {}\n",
            pick.site.station,
            placeholder(&pick.site.channel),
            pick.site.network,
            placeholder(&pick.site.location),
            pick.site.latitude,
            pick.site.longitude,
            pick.site.elevation,
            geo::millis_to_seconds(pick.time),
            pick.use_flag,
            placeholder(&pick.located_phase),
            pick.affinity,
            pick.quality,
            placeholder(&pick.source.agency_id),
            placeholder(&pick.source.author),
            AuthorType::parse(&pick.source.author_type).code(),
        ));
    }
    out
}

/// Write a result in hydra form: the extended header block, the error
/// ellipsoid, then the rewritten pick lines.
pub fn write_result(result: &LocationResult) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:14.3} {:8.4} {:9.4} {:6.2} {:4} {:4} {:4} {:4} {:3.0} {:8.4}\n",
        geo::millis_to_seconds(result.hypocenter.time),
        result.hypocenter.latitude,
        result.hypocenter.longitude,
        result.hypocenter.depth,
        result.num_stations_associated,
        result.num_phases_associated,
        result.num_stations_used,
        result.num_phases_used,
        result.azim_gap,
        result.min_distance,
    ));
    out.push_str(&format!(
        "{:6.2} {:6.1} {:6.1} {:6.1} {:6.2} {:6.1} {:6.1} {:6.1} {:3} {:5.1} {:5.1} {:6.4} {}\n",
        result.time_error,
        result.latitude_error,
        result.longitude_error,
        result.depth_error,
        result.residual_error,
        result.error_h,
        result.error_z,
        result.avg_h,
        result.quality,
        result.bayesian_depth,
        result.bayesian_spread,
        result.bayesian_depth_importance,
        result.exit_code,
    ));
    for axis in &result.error_ellipse {
        out.push_str(&format!(
            "{:6.1} {:3.0} {:3.0}  ",
            axis.semi_major, axis.azimuth, axis.plunge
        ));
    }
    out.push_str(&format!("{:3.0}\n", result.robust_gap));

    for pick in &result.output_data {
        out.push_str(&format!(
            "{:<5} {:<3} {:<2} {:<2} {:<8} {:6.2} {:6.2} {:3.0} {:6.4} {:6.4} {}\n",
            pick.site.station,
            placeholder(&pick.site.channel),
            pick.site.network,
            placeholder(&pick.site.location),
            placeholder(&pick.located_phase),
            pick.residual,
            pick.distance,
            pick.azimuth,
            pick.weight,
            pick.importance,
            pick.use_flag,
        ));
    }
    out
}
